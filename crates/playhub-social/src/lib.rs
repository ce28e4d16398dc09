//! Realtime social layer for the Playhub client.
//!
//! A request/acknowledge signaling channel over WebSocket, the multiparty
//! voice session controller built on it (media negotiation, remote
//! consumption, shared per-room state), and the text chat controller.

pub mod chat;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod signaling;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_support;

pub use chat::{ChatController, ChatEvent, ChatHistory, ChatHistoryConfig, ChatMessage};
pub use error::{ChatError, MediaError, SignalingError, VoiceError};
pub use identity::{Identity, IdentityProvider, StaticIdentity};
pub use signaling::{
    SignalingChannel, SignalingConfig, SignalingEvent, SignalingTransport, WsSignaling,
};
pub use voice::{
    MediaEngine, MediaSession, Participant, PendingProducerQueue, ProducerAnnouncement,
    RoomSessionStore, RoomState, RoomStatePatch, SessionConfig, SessionPhase, SpeakingDetector,
    Subscription,
};
