//! The per-room voice session: negotiation, local production, remote
//! consumption, mute, and teardown.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use playhub_common::RoomKey;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::VoiceError;
use crate::identity::{Identity, IdentityProvider};
use crate::protocol::{
    payload_room_id, Consume, CreateTransport, GetRtpCapabilities, VoiceJoin, VoiceLeave,
    VoiceServerEvent, VoiceSpeaking,
};
use crate::signaling::{SignalingChannel, SignalingEvent};

use super::bridge::SignalingBridge;
use super::media::{
    Consumer, MediaDevice, MediaEngine, MicrophoneStream, PlaybackElement, Producer,
    RecvTransport, SendTransport, TransportListener,
};
use super::pending::PendingProducerQueue;
use super::speaking::{DetectorSettings, SpeakingDetector};
use super::store::RoomCell;
use super::types::{
    Participant, ProducerAnnouncement, RoomState, RoomStatePatch, SessionConfig, SessionPhase,
};

/// Collaborators shared by every session of a store.
#[derive(Clone)]
pub(crate) struct SessionDeps {
    pub(crate) channel: SignalingChannel,
    pub(crate) engine: Arc<dyn MediaEngine>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) config: SessionConfig,
}

/// What [`MediaSession::consume_remote_producer`] did with an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed,
    /// The producer belongs to the local user.
    SkippedOwn,
    /// A consumer for the producer exists or is being created.
    AlreadyConsuming,
    /// Local transports are not ready; replayed once they are.
    Queued,
    /// The session is not joining or joined.
    Ignored,
    /// The session was torn down or the producer closed while consuming.
    Discarded,
}

struct RemoteConsumer {
    peer_id: String,
    consumer: Box<dyn Consumer>,
    playback: Box<dyn PlaybackElement>,
}

impl RemoteConsumer {
    fn release(self, producer_id: &str) {
        self.playback.pause();
        self.playback.detach();
        if let Err(e) = self.consumer.close() {
            warn!(producer_id, error = %e, "failed to close consumer");
        }
    }
}

struct InFlight {
    peer_id: String,
    generation: u64,
}

/// Everything needed to consume one producer outside the state lock.
struct ConsumeContext {
    room_id: String,
    recv: Arc<dyn RecvTransport>,
    rtp_capabilities: Value,
    generation: u64,
    cancel: CancellationToken,
}

struct SessionInner {
    phase: SessionPhase,
    /// Bumped by every teardown; consumers finishing under an older
    /// generation are closed instead of kept.
    generation: u64,
    /// Live while joining or joined; cancelled by teardown.
    attempt: Option<CancellationToken>,
    attempt_id: u64,
    last_outcome: Option<(u64, Result<(), VoiceError>)>,

    room_id: Option<String>,
    device: Option<Arc<dyn MediaDevice>>,
    recv: Option<Arc<dyn RecvTransport>>,
    send: Option<Arc<dyn SendTransport>>,
    microphone: Option<Arc<dyn MicrophoneStream>>,
    producer: Option<Arc<dyn Producer>>,
    detector: Option<SpeakingDetector>,

    consumers: HashMap<String, RemoteConsumer>,
    /// Consumes in flight, by producer id.
    consuming: HashMap<String, InFlight>,
    closed_in_flight: HashSet<String>,
    consume_ready: bool,
    pending: PendingProducerQueue,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            generation: 0,
            attempt: None,
            attempt_id: 0,
            last_outcome: None,
            room_id: None,
            device: None,
            recv: None,
            send: None,
            microphone: None,
            producer: None,
            detector: None,
            consumers: HashMap::new(),
            consuming: HashMap::new(),
            closed_in_flight: HashSet::new(),
            consume_ready: false,
            pending: PendingProducerQueue::new(),
        }
    }

    fn consume_context(&self) -> Option<ConsumeContext> {
        Some(ConsumeContext {
            room_id: self.room_id.clone()?,
            recv: Arc::clone(self.recv.as_ref()?),
            rtp_capabilities: self.device.as_ref()?.rtp_capabilities(),
            generation: self.generation,
            cancel: self.attempt.clone()?,
        })
    }
}

/// Handles released by a teardown, closed outside the state lock.
struct Released {
    room_id: Option<String>,
    device: Option<Arc<dyn MediaDevice>>,
    recv: Option<Arc<dyn RecvTransport>>,
    send: Option<Arc<dyn SendTransport>>,
    microphone: Option<Arc<dyn MicrophoneStream>>,
    producer: Option<Arc<dyn Producer>>,
    detector: Option<SpeakingDetector>,
    consumers: HashMap<String, RemoteConsumer>,
}

/// One voice room, shared by every observer of its key.
///
/// Operations are serialized by an internal lock: concurrent `join()`
/// calls coalesce onto a single negotiation, and `leave()` cancels an
/// in-flight join before tearing it down. State changes are published to
/// the room's observers through the owning [`RoomSessionStore`].
///
/// [`RoomSessionStore`]: super::RoomSessionStore
pub struct MediaSession {
    key: RoomKey,
    cell: Arc<RoomCell>,
    deps: SessionDeps,
    op_lock: tokio::sync::Mutex<()>,
    inner: Mutex<SessionInner>,
    muted: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl MediaSession {
    pub(crate) fn new(key: RoomKey, deps: SessionDeps) -> Self {
        Self {
            key,
            cell: Arc::new(RoomCell::new()),
            deps,
            op_lock: tokio::sync::Mutex::new(()),
            inner: Mutex::new(SessionInner::new()),
            muted: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    pub fn state(&self) -> RoomState {
        self.cell.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().phase
    }

    /// Server-assigned room id, once `voice-join` succeeded.
    pub fn room_id(&self) -> Option<String> {
        self.inner.lock().room_id.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.lock().consumers.len()
    }

    pub fn has_consumer(&self, producer_id: &str) -> bool {
        self.inner.lock().consumers.contains_key(producer_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub(crate) fn cell(&self) -> &Arc<RoomCell> {
        &self.cell
    }

    fn is_local_peer(&self, peer_id: &str) -> bool {
        self.deps
            .identity
            .current()
            .is_some_and(|id| id.user_id == peer_id)
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// Join the room's voice call.
    ///
    /// Resolves immediately if already joined. A caller arriving while
    /// another join is in flight waits for it and shares its outcome.
    /// Any failure rolls every acquired resource back and leaves the
    /// session idle.
    pub async fn join(&self) -> Result<(), VoiceError> {
        let Some(identity) = self.deps.identity.current() else {
            self.deps.identity.request_login("join voice");
            return Err(VoiceError::AuthRequired);
        };
        if !self.deps.channel.is_connected() {
            return Err(VoiceError::NotConnected);
        }

        let followed = {
            let inner = self.inner.lock();
            match inner.phase {
                SessionPhase::Joined => return Ok(()),
                SessionPhase::Joining => Some(inner.attempt_id),
                _ => None,
            }
        };

        let _op = self.op_lock.lock().await;
        let attempt = {
            let mut inner = self.inner.lock();
            if inner.phase == SessionPhase::Joined {
                return Ok(());
            }
            if let (Some(id), Some((done, outcome))) = (followed, &inner.last_outcome) {
                if *done == id {
                    return outcome.clone();
                }
            }
            if self.shutdown.is_cancelled() {
                return Err(VoiceError::Cancelled);
            }
            inner.phase = SessionPhase::Joining;
            inner.attempt_id += 1;
            let token = self.shutdown.child_token();
            inner.attempt = Some(token.clone());
            (inner.attempt_id, token)
        };
        let (attempt_id, token) = attempt;

        info!(room = %self.key, "joining voice");
        let outcome = self.negotiate(&identity, &token).await;

        match &outcome {
            Ok(()) => {
                self.inner.lock().phase = SessionPhase::Joined;
                self.cell.publish(RoomStatePatch::joined(true, true));
                info!(room = %self.key, "voice joined");
            }
            Err(e) => {
                warn!(room = %self.key, error = %e, "voice join failed, rolling back");
                self.teardown();
                self.cell.publish(RoomStatePatch::reset());
            }
        }
        self.inner.lock().last_outcome = Some((attempt_id, outcome.clone()));
        outcome
    }

    async fn negotiate(&self, identity: &Identity, token: &CancellationToken) -> Result<(), VoiceError> {
        let channel = &self.deps.channel;
        let engine = &self.deps.engine;

        let join = VoiceJoin {
            target: self.key.as_str().to_string(),
        };
        let room_id = channel.request(&join, Some(token)).await?.room_id;
        self.inner.lock().room_id = Some(room_id.clone());
        debug!(room = %self.key, room_id = %room_id, "voice room assigned");

        let capabilities = channel
            .request(&GetRtpCapabilities { room_id: room_id.clone() }, Some(token))
            .await?
            .rtp_capabilities;

        let device: Arc<dyn MediaDevice> =
            cancellable(token, engine.load_device(&capabilities)).await?.into();
        self.inner.lock().device = Some(Arc::clone(&device));

        let listener: Arc<dyn TransportListener> = Arc::new(SignalingBridge::new(
            channel.clone(),
            room_id.clone(),
            token.clone(),
        ));

        // Receive leg first: the relay expects it before anything is produced.
        let params = channel
            .request(&CreateTransport { room_id: room_id.clone() }, Some(token))
            .await?
            .params;
        let recv: Arc<dyn RecvTransport> = device
            .create_recv_transport(&params, Arc::clone(&listener))?
            .into();
        self.inner.lock().recv = Some(recv);
        debug!(room_id = %room_id, transport_id = %params.id, "recv transport created");

        let params = channel
            .request(&CreateTransport { room_id: room_id.clone() }, Some(token))
            .await?
            .params;
        let send: Arc<dyn SendTransport> = device
            .create_send_transport(&params, Arc::clone(&listener))?
            .into();
        self.inner.lock().send = Some(Arc::clone(&send));
        debug!(room_id = %room_id, transport_id = %params.id, "send transport created");

        let microphone: Arc<dyn MicrophoneStream> =
            cancellable(token, engine.open_microphone(self.deps.config.audio)).await?.into();
        self.inner.lock().microphone = Some(Arc::clone(&microphone));
        let track = microphone
            .audio_track()
            .ok_or_else(|| VoiceError::MediaAccessDenied("no audio track".into()))?;

        let producer: Arc<dyn Producer> = cancellable(token, send.produce(track)).await?.into();
        info!(room_id = %room_id, producer_id = %producer.id(), "microphone published");
        self.inner.lock().producer = Some(producer);

        self.muted.store(false, Ordering::Release);
        let local_peer = identity.user_id.clone();
        self.cell.publish_with(|state| {
            state.merge_participant(Participant::new(
                local_peer.clone(),
                identity.display_name.clone(),
            ));
        });

        let meter = microphone.level_meter(self.deps.config.analyser_bins)?;
        let detector = SpeakingDetector::start(
            meter,
            DetectorSettings {
                threshold: self.deps.config.speaking_threshold,
                frame_interval: self.deps.config.frame_interval,
                bins: self.deps.config.analyser_bins,
            },
            self.speaking_reporter(room_id.clone(), local_peer, token.clone()),
        );
        self.inner.lock().detector = Some(detector);

        self.drain_pending(token).await
    }

    /// Detector callback: local roster flag plus a `voice-speaking` broadcast.
    fn speaking_reporter(
        &self,
        room_id: String,
        local_peer: String,
        token: CancellationToken,
    ) -> impl FnMut(bool) + Send + 'static {
        let cell = Arc::clone(&self.cell);
        let channel = self.deps.channel.clone();
        let muted = Arc::clone(&self.muted);
        move |speaking| {
            if muted.load(Ordering::Acquire) || token.is_cancelled() {
                return;
            }
            cell.publish_with(|state| {
                state.update_participant(&local_peer, |p| p.speaking = speaking);
            });
            let notice = VoiceSpeaking {
                room_id: room_id.clone(),
                speaking,
            };
            if let Err(e) = channel.notify(&notice) {
                debug!(error = %e, "speaking update not sent");
            }
        }
    }

    /// Replay announcements queued during setup, in arrival order.
    /// Announcements arriving meanwhile keep queueing behind them.
    async fn drain_pending(&self, token: &CancellationToken) -> Result<(), VoiceError> {
        loop {
            let next = {
                let mut inner = self.inner.lock();
                let next = inner.pending.pop();
                if next.is_none() {
                    inner.consume_ready = true;
                }
                next
            };
            let Some(announcement) = next else {
                return Ok(());
            };
            if token.is_cancelled() {
                return Err(VoiceError::Cancelled);
            }
            match self.reserve(&announcement, true) {
                Ok(ctx) => match self.consume_reserved(announcement, ctx).await {
                    Err(VoiceError::Cancelled) => return Err(VoiceError::Cancelled),
                    Err(_) | Ok(_) => {}
                },
                Err(outcome) => debug!(?outcome, "queued announcement skipped"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Remote consumption
    // -----------------------------------------------------------------------

    /// Consume a remote producer, or queue it until local transports are
    /// ready. A failure affects only this producer.
    pub async fn consume_remote_producer(
        &self,
        announcement: ProducerAnnouncement,
    ) -> Result<ConsumeOutcome, VoiceError> {
        match self.reserve(&announcement, false) {
            Ok(ctx) => self.consume_reserved(announcement, ctx).await,
            Err(outcome) => Ok(outcome),
        }
    }

    /// Claim the producer id for a consume, or say why not.
    fn reserve(
        &self,
        announcement: &ProducerAnnouncement,
        draining: bool,
    ) -> Result<ConsumeContext, ConsumeOutcome> {
        if self.is_local_peer(&announcement.peer_id) {
            return Err(ConsumeOutcome::SkippedOwn);
        }
        let producer_id = &announcement.producer_id;
        let mut inner = self.inner.lock();
        if inner.consumers.contains_key(producer_id) || inner.consuming.contains_key(producer_id) {
            return Err(ConsumeOutcome::AlreadyConsuming);
        }
        if matches!(inner.phase, SessionPhase::Idle | SessionPhase::Leaving) {
            return Err(ConsumeOutcome::Ignored);
        }
        let ctx = if inner.consume_ready || draining {
            inner.consume_context()
        } else {
            None
        };
        match ctx {
            Some(ctx) => {
                let in_flight = InFlight {
                    peer_id: announcement.peer_id.clone(),
                    generation: ctx.generation,
                };
                inner.consuming.insert(producer_id.clone(), in_flight);
                Ok(ctx)
            }
            None => {
                debug!(producer_id = %producer_id, peer_id = %announcement.peer_id, "transports not ready, queued");
                inner.pending.enqueue(announcement.clone());
                Err(ConsumeOutcome::Queued)
            }
        }
    }

    async fn consume_reserved(
        &self,
        announcement: ProducerAnnouncement,
        ctx: ConsumeContext,
    ) -> Result<ConsumeOutcome, VoiceError> {
        let producer_id = announcement.producer_id.clone();
        let result = self.open_consumer(&announcement, &ctx).await;

        let mut inner = self.inner.lock();
        let current = inner.generation == ctx.generation;
        let closed = current && inner.closed_in_flight.remove(&producer_id);
        if current {
            inner.consuming.remove(&producer_id);
        }

        match result {
            Ok(remote) => {
                if closed || !current {
                    drop(inner);
                    debug!(producer_id = %producer_id, "producer went away while consuming");
                    remote.release(&producer_id);
                    return Ok(ConsumeOutcome::Discarded);
                }
                inner.consumers.insert(producer_id.clone(), remote);
                drop(inner);

                let participant =
                    Participant::new(announcement.peer_id.clone(), announcement.display_name);
                self.cell.publish_with(|state| {
                    state.merge_participant(participant);
                });
                info!(producer_id = %producer_id, peer_id = %announcement.peer_id, "consuming remote producer");
                Ok(ConsumeOutcome::Consumed)
            }
            Err(VoiceError::Cancelled) => Err(VoiceError::Cancelled),
            Err(e) => {
                drop(inner);
                warn!(producer_id = %producer_id, peer_id = %announcement.peer_id, error = %e, "consume failed");
                Err(VoiceError::ConsumeFailed {
                    producer_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn open_consumer(
        &self,
        announcement: &ProducerAnnouncement,
        ctx: &ConsumeContext,
    ) -> Result<RemoteConsumer, VoiceError> {
        let request = Consume {
            room_id: ctx.room_id.clone(),
            recv_transport_id: ctx.recv.id().to_string(),
            producer_id: announcement.producer_id.clone(),
            rtp_capabilities: ctx.rtp_capabilities.clone(),
        };
        let params = self
            .deps
            .channel
            .request(&request, Some(&ctx.cancel))
            .await?
            .params;

        let consumer = cancellable(&ctx.cancel, ctx.recv.consume(params)).await?;
        let playback = match self
            .deps
            .engine
            .create_playback(&consumer.track(), self.deps.config.playback_volume)
        {
            Ok(playback) => playback,
            Err(e) => {
                let _ = consumer.close();
                return Err(e.into());
            }
        };
        Ok(RemoteConsumer {
            peer_id: announcement.peer_id.clone(),
            consumer,
            playback,
        })
    }

    // -----------------------------------------------------------------------
    // Mute
    // -----------------------------------------------------------------------

    /// Pause or resume the local producer. Returns whether the mic is now on.
    pub async fn toggle_mic(&self) -> Result<bool, VoiceError> {
        let _op = self.op_lock.lock().await;
        let (producer, room_id) = {
            let inner = self.inner.lock();
            if inner.phase != SessionPhase::Joined {
                return Err(VoiceError::NotJoined);
            }
            match (&inner.producer, &inner.room_id) {
                (Some(producer), Some(room_id)) => (Arc::clone(producer), room_id.clone()),
                _ => return Err(VoiceError::NotJoined),
            }
        };
        let local_peer = self.deps.identity.current().map(|id| id.user_id);

        if producer.is_paused() {
            producer.resume().await?;
            self.muted.store(false, Ordering::Release);
            self.reset_detector();
            self.cell.publish_with(|state| {
                state.mic_on = true;
                if let Some(peer) = &local_peer {
                    state.update_participant(peer, |p| p.muted = false);
                }
            });
            info!(room_id = %room_id, "microphone on");
            return Ok(true);
        }

        self.muted.store(true, Ordering::Release);
        if let Err(e) = producer.pause().await {
            self.muted.store(false, Ordering::Release);
            return Err(e.into());
        }
        self.reset_detector();
        self.cell.publish_with(|state| {
            state.mic_on = false;
            if let Some(peer) = &local_peer {
                state.update_participant(peer, |p| {
                    p.muted = true;
                    p.speaking = false;
                });
            }
        });
        let notice = VoiceSpeaking {
            room_id: room_id.clone(),
            speaking: false,
        };
        if let Err(e) = self.deps.channel.notify(&notice) {
            debug!(error = %e, "speaking update not sent");
        }
        info!(room_id = %room_id, "microphone muted");
        Ok(false)
    }

    fn reset_detector(&self) {
        if let Some(detector) = self.inner.lock().detector.as_ref() {
            detector.reset();
        }
    }

    // -----------------------------------------------------------------------
    // Leave & teardown
    // -----------------------------------------------------------------------

    /// Leave the call from any state. Never fails; an in-flight join is
    /// cancelled and everything it acquired is released.
    pub async fn leave(&self) {
        if let Some(attempt) = self.inner.lock().attempt.as_ref() {
            attempt.cancel();
        }
        let _op = self.op_lock.lock().await;
        self.teardown();
        self.cell.publish(RoomStatePatch::reset());
        info!(room = %self.key, "left voice");
    }

    /// Cancel any in-flight join and stop reacting to server events.
    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
        debug!(room = %self.key, "voice session shut down");
    }

    /// Release every handle, each failure logged and skipped.
    fn teardown(&self) {
        let released = {
            let mut inner = self.inner.lock();
            inner.phase = SessionPhase::Leaving;
            inner.generation += 1;
            inner.consume_ready = false;
            let dropped = inner.pending.clear();
            if dropped > 0 {
                debug!(dropped, "discarding queued announcements");
            }
            inner.consuming.clear();
            inner.closed_in_flight.clear();
            if let Some(attempt) = inner.attempt.take() {
                attempt.cancel();
            }
            Released {
                room_id: inner.room_id.take(),
                device: inner.device.take(),
                recv: inner.recv.take(),
                send: inner.send.take(),
                microphone: inner.microphone.take(),
                producer: inner.producer.take(),
                detector: inner.detector.take(),
                consumers: std::mem::take(&mut inner.consumers),
            }
        };

        if let Some(detector) = &released.detector {
            detector.stop();
        }
        for (producer_id, remote) in released.consumers {
            remote.release(&producer_id);
        }
        if let Some(microphone) = &released.microphone {
            microphone.stop();
        }
        if let Some(producer) = &released.producer {
            if let Err(e) = producer.close() {
                warn!(error = %e, "failed to close producer");
            }
        }
        if let Some(send) = &released.send {
            if let Err(e) = send.close() {
                warn!(transport_id = %send.id(), error = %e, "failed to close send transport");
            }
        }
        if let Some(recv) = &released.recv {
            if let Err(e) = recv.close() {
                warn!(transport_id = %recv.id(), error = %e, "failed to close recv transport");
            }
        }
        drop(released.device);

        if let Some(room_id) = released.room_id {
            if let Err(e) = self.deps.channel.notify(&VoiceLeave { room_id }) {
                debug!(error = %e, "voice-leave not sent");
            }
        }

        self.muted.store(false, Ordering::Release);
        self.inner.lock().phase = SessionPhase::Idle;
    }

    // -----------------------------------------------------------------------
    // Server events
    // -----------------------------------------------------------------------

    fn route_push(self: &Arc<Self>, event: &str, payload: &Value) {
        let parsed = match VoiceServerEvent::parse(event, payload) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return,
            Err(e) => {
                warn!(room = %self.key, error = %e, "dropping malformed voice event");
                return;
            }
        };
        if let Some(target) = payload_room_id(payload) {
            let (phase, room_id) = {
                let inner = self.inner.lock();
                (inner.phase, inner.room_id.clone())
            };
            // Before the `voice-join` ack the server room id is unknown;
            // such events are let through and queue like any early event.
            let unassigned = phase == SessionPhase::Joining && room_id.is_none();
            if !unassigned && room_id.as_deref() != Some(target) {
                debug!(room = %self.key, target, event, "voice event for another room");
                return;
            }
        }
        self.handle_event(parsed);
    }

    /// Apply one server event to this session. Never waits on the network:
    /// a claimed announcement is consumed on its own task.
    pub(crate) fn handle_event(self: &Arc<Self>, event: VoiceServerEvent) {
        if matches!(self.phase(), SessionPhase::Idle | SessionPhase::Leaving) {
            debug!(room = %self.key, ?event, "voice event while not in a call");
            return;
        }
        match event {
            VoiceServerEvent::RosterSnapshot { participants } => {
                debug!(room = %self.key, count = participants.len(), "roster snapshot");
                self.cell.publish(RoomStatePatch::participants(participants));
            }
            VoiceServerEvent::ProducerAnnounced(announcement) => {
                let ctx = match self.reserve(&announcement, false) {
                    Ok(ctx) => ctx,
                    Err(outcome) => {
                        debug!(room = %self.key, producer_id = %announcement.producer_id, ?outcome, "announcement not consumed now");
                        return;
                    }
                };
                let session = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = session.consume_reserved(announcement, ctx).await {
                        debug!(room = %session.key, error = %e, "announcement not consumed");
                    }
                });
            }
            VoiceServerEvent::PeerLeft { peer_id } => self.drop_peer(&peer_id),
            VoiceServerEvent::ProducerClosed { producer_id } => self.drop_producer(&producer_id),
            VoiceServerEvent::SpeakingUpdate { peer_id, speaking } => {
                if self.is_local_peer(&peer_id) {
                    return;
                }
                self.cell.publish_with(|state| {
                    state.update_participant(&peer_id, |p| p.speaking = speaking);
                });
            }
        }
    }

    /// Skipped events may include the `speaking: false` ending a remote
    /// peer's turn; clear those flags rather than leave them stuck.
    fn clear_remote_speaking(&self) {
        let local = self.deps.identity.current().map(|id| id.user_id);
        self.cell.publish_with(|state| {
            for p in &mut state.participants {
                if local.as_deref() != Some(p.peer_id.as_str()) {
                    p.speaking = false;
                }
            }
        });
    }

    /// Close every consumer of `peer_id` and drop its roster entry.
    fn drop_peer(&self, peer_id: &str) {
        let removed = {
            let mut inner = self.inner.lock();
            let gone: Vec<String> = inner
                .consumers
                .iter()
                .filter(|(_, remote)| remote.peer_id == peer_id)
                .map(|(id, _)| id.clone())
                .collect();
            let removed: Vec<(String, RemoteConsumer)> = gone
                .into_iter()
                .filter_map(|id| inner.consumers.remove(&id).map(|remote| (id, remote)))
                .collect();
            let in_flight: Vec<String> = inner
                .consuming
                .iter()
                .filter(|(_, in_flight)| in_flight.peer_id == peer_id)
                .map(|(id, _)| id.clone())
                .collect();
            inner.closed_in_flight.extend(in_flight);
            inner.pending.remove_where(|entry| entry.peer_id == peer_id);
            removed
        };
        for (producer_id, remote) in removed {
            remote.release(&producer_id);
        }
        self.cell.publish_with(|state| {
            state.remove_participant(peer_id);
        });
        debug!(room = %self.key, peer_id, "peer left");
    }

    fn drop_producer(&self, producer_id: &str) {
        let removed = {
            let mut inner = self.inner.lock();
            if inner.consuming.contains_key(producer_id) {
                inner.closed_in_flight.insert(producer_id.to_string());
            }
            inner.pending.remove_where(|entry| entry.producer_id == producer_id);
            inner.consumers.remove(producer_id)
        };
        if let Some(remote) = removed {
            remote.release(producer_id);
        }
        debug!(room = %self.key, producer_id, "producer closed");
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Run `fut` unless `token` fires first.
async fn cancellable<T, E>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, VoiceError>
where
    E: Into<VoiceError>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(VoiceError::Cancelled),
        result = fut => result.map_err(Into::into),
    }
}

/// Feed server pushes into `session` until it is shut down or dropped.
pub(crate) fn spawn_listener(session: &Arc<MediaSession>) {
    let mut events = session.deps.channel.subscribe();
    let weak: Weak<MediaSession> = Arc::downgrade(session);
    let shutdown = session.shutdown.clone();
    let key = session.key.clone();

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = events.recv() => received,
            };
            match received {
                Ok(SignalingEvent::Push { event, payload }) => {
                    let Some(session) = weak.upgrade() else { break };
                    session.route_push(&event, &payload);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(room = %key, skipped, "voice event stream lagged");
                    let Some(session) = weak.upgrade() else { break };
                    session.clear_remote_speaking();
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(room = %key, "voice event listener stopped");
    });
}
