//! Configuration, wire envelope, and events for the signaling transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SignalingConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` on the upgrade request.
    pub access_token: Option<String>,
    /// Local user, announced on the upgrade request.
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl std::fmt::Debug for SignalingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingConfig")
            .field("url", &self.url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("connect_timeout", &self.connect_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .finish()
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4000/socket".into(),
            access_token: None,
            user_id: None,
            display_name: None,
            connect_timeout: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(25),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// One JSON text frame. Requests carry a fresh `ref`; the server answers
/// with an `ack` frame echoing it. Frames without a pending `ref` are
/// server pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub msg_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Events & commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum SignalingEvent {
    Connected,
    Disconnected,
    /// Server-initiated event.
    Push {
        event: String,
        payload: serde_json::Value,
    },
    Error(String),
}

#[derive(Debug)]
pub(crate) enum SignalingCommand {
    Send(Envelope),
    Disconnect,
}
