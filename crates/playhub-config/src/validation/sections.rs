//! Per-section validation rules.

use crate::schema::PlayhubConfig;
use regex::Regex;

use super::helpers::{validate_range, validate_range_f64};

const SIGNALING_URL_PATTERN: &str = r"^wss?://[^\s/]+(/\S*)?$";

pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &PlayhubConfig) {
    let s = &config.signaling;

    match Regex::new(SIGNALING_URL_PATTERN) {
        Ok(re) if !re.is_match(&s.url) => {
            errors.push(format!(
                "signaling.url = {:?} must be a ws:// or wss:// URL",
                s.url
            ));
        }
        Ok(_) => {}
        Err(e) => errors.push(format!("signaling.url pattern failed to compile: {e}")),
    }

    validate_range(errors, "signaling.call_timeout_ms", s.call_timeout_ms, 1_000, 60_000);
    validate_range(errors, "signaling.connect_timeout_secs", s.connect_timeout_secs, 1, 120);
    validate_range(errors, "signaling.heartbeat_interval_secs", s.heartbeat_interval_secs, 5, 300);

    if s.reconnect_delay_secs == 0 {
        errors.push("signaling.reconnect_delay_secs must be at least 1".into());
    }
    if s.max_reconnect_delay_secs < s.reconnect_delay_secs {
        errors.push(format!(
            "signaling.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            s.max_reconnect_delay_secs, s.reconnect_delay_secs
        ));
    }
}

pub(crate) fn validate_voice(errors: &mut Vec<String>, config: &PlayhubConfig) {
    let v = &config.voice;
    validate_range_f64(errors, "voice.speaking_threshold", v.speaking_threshold, 0.0, 1.0);
    validate_range(errors, "voice.frame_interval_ms", v.frame_interval_ms, 5, 250);
    validate_range(errors, "voice.analyser_bins", u64::from(v.analyser_bins), 16, 2048);
    validate_range_f64(errors, "voice.playback_volume", v.playback_volume, 0.0, 1.0);
}

pub(crate) fn validate_chat(errors: &mut Vec<String>, config: &PlayhubConfig) {
    validate_range(
        errors,
        "chat.max_messages_per_room",
        u64::from(config.chat.max_messages_per_room),
        10,
        10_000,
    );
}

pub(crate) fn validate_identity(errors: &mut Vec<String>, config: &PlayhubConfig) {
    if let Some(name) = &config.identity.display_name {
        let len = name.trim().chars().count() as u64;
        validate_range(errors, "identity.display_name length", len, 1, 32);
    }
    if let Some(id) = &config.identity.user_id {
        if id.trim().is_empty() {
            errors.push("identity.user_id must not be blank".into());
        }
    }
}
