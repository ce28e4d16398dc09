//! Tests for the full validation pipeline.

use super::*;

#[test]
fn default_config_validates() {
    assert!(validate(&PlayhubConfig::default()).is_ok());
}

#[test]
fn catches_non_websocket_url() {
    let mut config = PlayhubConfig::default();
    config.signaling.url = "https://example.com/socket".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.url"));
}

#[test]
fn accepts_secure_websocket_url() {
    let mut config = PlayhubConfig::default();
    config.signaling.url = "wss://play.example.com:443/socket/websocket".into();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_call_timeout_too_small() {
    let mut config = PlayhubConfig::default();
    config.signaling.call_timeout_ms = 10;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.call_timeout_ms"));
}

#[test]
fn catches_inverted_reconnect_delays() {
    let mut config = PlayhubConfig::default();
    config.signaling.reconnect_delay_secs = 10;
    config.signaling.max_reconnect_delay_secs = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("max_reconnect_delay_secs"));
}

#[test]
fn catches_threshold_above_one() {
    let mut config = PlayhubConfig::default();
    config.voice.speaking_threshold = 1.5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("voice.speaking_threshold"));
}

#[test]
fn catches_nan_volume() {
    let mut config = PlayhubConfig::default();
    config.voice.playback_volume = f64::NAN;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("voice.playback_volume"));
}

#[test]
fn catches_tiny_chat_history() {
    let mut config = PlayhubConfig::default();
    config.chat.max_messages_per_room = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("chat.max_messages_per_room"));
}

#[test]
fn catches_blank_identity_fields() {
    let mut config = PlayhubConfig::default();
    config.identity.user_id = Some("  ".into());
    config.identity.display_name = Some(String::new());
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("identity.user_id"));
    assert!(err.contains("identity.display_name"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = PlayhubConfig::default();
    config.voice.frame_interval_ms = 0;
    config.voice.analyser_bins = 4;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("voice.frame_interval_ms"));
    assert!(err.contains("voice.analyser_bins"));
    assert!(err.contains("; "));
}
