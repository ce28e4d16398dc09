//! Signaling connection settings.

use serde::{Deserialize, Serialize};

/// Where and how the client reaches the signaling server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingSettings {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Bearer token sent on the upgrade request, if any.
    pub access_token: Option<String>,
    /// Acknowledgement timeout for every request (valid range: 1000-60000).
    pub call_timeout_ms: u64,
    /// Timeout for the initial WebSocket handshake (valid range: 1-120).
    pub connect_timeout_secs: u64,
    /// Interval between keepalive pings (valid range: 5-300).
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4000/socket".into(),
            access_token: None,
            call_timeout_ms: 10_000,
            connect_timeout_secs: 15,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}
