//! The media stack a voice session drives.
//!
//! Devices, transports, producers/consumers, microphone capture and
//! playback are provided by the host platform. The session only talks to
//! these traits; transports report their connect and produce negotiation
//! back through a [`TransportListener`] supplied by the session.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{MediaError, SignalingError};
use crate::protocol::{ConsumerParams, MediaKind, TransportParams};

use super::types::AudioConstraints;

pub type MediaResult<T> = Result<T, MediaError>;

/// Opaque handle to a media track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
}

impl MediaTrack {
    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MediaKind::Audio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Failed,
    Disconnected,
    Closed,
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Build a device from the relay's router capabilities.
    async fn load_device(&self, router_capabilities: &Value) -> MediaResult<Box<dyn MediaDevice>>;

    /// Open the local microphone with the given processing.
    async fn open_microphone(
        &self,
        constraints: AudioConstraints,
    ) -> MediaResult<Box<dyn MicrophoneStream>>;

    /// Attach `track` to a new auto-playing output element.
    fn create_playback(&self, track: &MediaTrack, volume: f32)
        -> MediaResult<Box<dyn PlaybackElement>>;
}

pub trait MediaDevice: Send + Sync {
    fn rtp_capabilities(&self) -> Value;

    fn create_recv_transport(
        &self,
        params: &TransportParams,
        listener: Arc<dyn TransportListener>,
    ) -> MediaResult<Box<dyn RecvTransport>>;

    fn create_send_transport(
        &self,
        params: &TransportParams,
        listener: Arc<dyn TransportListener>,
    ) -> MediaResult<Box<dyn SendTransport>>;
}

/// Negotiation callbacks a transport raises while connecting or producing.
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// First use of the transport: deliver the local DTLS parameters.
    async fn on_connect(&self, transport_id: &str, dtls_parameters: Value)
        -> Result<(), SignalingError>;

    /// A track is being produced; returns the server-assigned producer id.
    async fn on_produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<String, SignalingError>;

    fn on_connection_state(&self, _transport_id: &str, _state: TransportState) {}
}

#[async_trait]
pub trait SendTransport: Send + Sync {
    fn id(&self) -> &str;
    /// Resolves only after the server has assigned the producer id.
    async fn produce(&self, track: MediaTrack) -> MediaResult<Box<dyn Producer>>;
    fn close(&self) -> MediaResult<()>;
}

#[async_trait]
pub trait RecvTransport: Send + Sync {
    fn id(&self) -> &str;
    async fn consume(&self, params: ConsumerParams) -> MediaResult<Box<dyn Consumer>>;
    fn close(&self) -> MediaResult<()>;
}

#[async_trait]
pub trait Producer: Send + Sync {
    fn id(&self) -> &str;
    fn is_paused(&self) -> bool;
    async fn pause(&self) -> MediaResult<()>;
    async fn resume(&self) -> MediaResult<()>;
    fn close(&self) -> MediaResult<()>;
}

pub trait Consumer: Send + Sync {
    fn id(&self) -> &str;
    fn producer_id(&self) -> &str;
    fn track(&self) -> MediaTrack;
    fn close(&self) -> MediaResult<()>;
}

pub trait MicrophoneStream: Send + Sync {
    fn audio_track(&self) -> Option<MediaTrack>;
    /// Tap the stream with a frequency analyser of `bins` bins.
    fn level_meter(&self, bins: usize) -> MediaResult<Box<dyn LevelMeter>>;
    /// Stop every capture track.
    fn stop(&self);
}

/// Analyser node on a local stream.
pub trait LevelMeter: Send {
    /// Fill `bins` with the current byte frequency magnitudes.
    fn sample(&mut self, bins: &mut [u8]);
    fn disconnect(&mut self);
}

pub trait PlaybackElement: Send + Sync {
    fn pause(&self);
    /// Release the attached track.
    fn detach(&self);
}
