//! Multiparty voice: negotiation with the media relay, remote
//! consumption, speaking detection and the shared per-room state.

mod bridge;
pub mod media;
mod pending;
mod session;
mod speaking;
mod store;
mod types;


pub use media::{
    Consumer, LevelMeter, MediaDevice, MediaEngine, MediaResult, MediaTrack, MicrophoneStream,
    PlaybackElement, Producer, RecvTransport, SendTransport, TransportListener, TransportState,
};
pub use pending::PendingProducerQueue;
pub use session::{ConsumeOutcome, MediaSession};
pub use speaking::{normalized_rms, DetectorSettings, SpeakingDetector};
pub use store::{RoomSessionStore, Subscription};
pub use types::{
    AudioConstraints, Participant, ProducerAnnouncement, RoomState, RoomStatePatch,
    SessionConfig, SessionPhase,
};
