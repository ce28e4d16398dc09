//! Error types for signaling, media, voice sessions and chat.

use std::time::Duration;

use playhub_common::PlayhubError;

/// Failure of a single signaling request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling channel is not connected")]
    NotConnected,

    #[error("no acknowledgement for `{event}` within {after:?}")]
    Timeout { event: String, after: Duration },

    #[error("`{event}` rejected: {message}")]
    Rejected { event: String, message: String },

    #[error("connection lost while waiting for `{event}`")]
    ConnectionLost { event: String },

    #[error("`{event}` cancelled")]
    Cancelled { event: String },

    #[error("malformed `{event}` payload: {reason}")]
    Malformed { event: String, reason: String },
}

/// Failure reported by the media engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("media access denied: {0}")]
    AccessDenied(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by voice session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    #[error("sign in required to join voice")]
    AuthRequired,

    #[error("signaling channel is not connected")]
    NotConnected,

    #[error("not in a voice room")]
    NotJoined,

    #[error("timed out waiting for `{event}`")]
    Timeout { event: String },

    #[error("microphone unavailable: {0}")]
    MediaAccessDenied(String),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("failed to consume producer {producer_id}: {reason}")]
    ConsumeFailed { producer_id: String, reason: String },

    #[error("voice join cancelled")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<SignalingError> for VoiceError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::NotConnected | SignalingError::ConnectionLost { .. } => {
                VoiceError::NotConnected
            }
            SignalingError::Timeout { event, .. } => VoiceError::Timeout { event },
            SignalingError::Rejected { event, message } => {
                VoiceError::NegotiationFailed(format!("{event}: {message}"))
            }
            SignalingError::Cancelled { .. } => VoiceError::Cancelled,
            SignalingError::Malformed { event, reason } => {
                VoiceError::Protocol(format!("{event}: {reason}"))
            }
        }
    }
}

impl From<MediaError> for VoiceError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::AccessDenied(reason) => VoiceError::MediaAccessDenied(reason),
            MediaError::Signaling(e) => e.into(),
            MediaError::Transport(reason) | MediaError::Other(reason) => {
                VoiceError::NegotiationFailed(reason)
            }
        }
    }
}

/// Errors surfaced by the text chat controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("sign in required to chat")]
    AuthRequired,

    #[error("signaling channel is not connected")]
    NotConnected,

    #[error("not in a chat room")]
    NotJoined,

    #[error("join refused for room {0}")]
    JoinRefused(String),

    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

impl From<SignalingError> for PlayhubError {
    fn from(err: SignalingError) -> Self {
        PlayhubError::Signaling(err.to_string())
    }
}

impl From<VoiceError> for PlayhubError {
    fn from(err: VoiceError) -> Self {
        PlayhubError::Voice(err.to_string())
    }
}

impl From<ChatError> for PlayhubError {
    fn from(err: ChatError) -> Self {
        PlayhubError::Chat(err.to_string())
    }
}
