//! In-memory signaling server and media engine for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Semaphore};

use crate::error::{MediaError, SignalingError};
use crate::identity::{Identity, StaticIdentity};
use crate::protocol::{events, ConsumerParams, MediaKind, TransportParams};
use crate::signaling::{SignalingChannel, SignalingEvent, SignalingTransport};
use crate::voice::media::{
    Consumer, LevelMeter, MediaDevice, MediaEngine, MediaResult, MediaTrack, MicrophoneStream,
    PlaybackElement, Producer, RecvTransport, SendTransport, TransportListener, TransportState,
};
use crate::voice::AudioConstraints;

/// Let spawned tasks run until they block.
pub(crate) async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub(crate) fn signed_in(user_id: &str, name: &str) -> Arc<StaticIdentity> {
    Arc::new(StaticIdentity::signed_in(Identity::new(user_id, name)))
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// How the fake server answers one request.
pub(crate) enum Reply {
    Ack(Value),
    /// Never acknowledged.
    Never,
    /// Acknowledged once the gate hands out a permit.
    Gated(Arc<Semaphore>, Value),
}

type Responder = Box<dyn Fn(&Value) -> Reply + Send + Sync>;

pub(crate) struct FakeSignaling {
    connected: AtomicBool,
    events: broadcast::Sender<SignalingEvent>,
    responders: Mutex<HashMap<String, Responder>>,
    calls: Mutex<Vec<(String, Value)>>,
    emits: Mutex<Vec<(String, Value)>>,
}

impl FakeSignaling {
    /// Connected, acknowledging every request with `{}`.
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            connected: AtomicBool::new(true),
            events,
            responders: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            emits: Mutex::new(Vec::new()),
        })
    }

    /// Scripted to complete a voice join into room `r1` and a chat join.
    pub(crate) fn voice_server() -> Arc<Self> {
        let server = Self::new();
        server.reply(events::VOICE_JOIN, json!({"roomId": "r1"}));
        server.reply(
            events::GET_RTP_CAPABILITIES,
            json!({"rtpCapabilities": {"codecs": [{"mimeType": "audio/opus"}]}}),
        );
        let transports = AtomicUsize::new(0);
        server.respond(events::CREATE_TRANSPORT, move |_| {
            let n = transports.fetch_add(1, Ordering::Relaxed) + 1;
            Reply::Ack(json!({"params": {"id": format!("t-{n}"), "iceParameters": {}}}))
        });
        server.reply(events::CONNECT_TRANSPORT, json!({}));
        server.reply(events::PRODUCE, json!({"id": "local-producer"}));
        server.respond(events::CONSUME, |payload| {
            let producer_id = payload["producerId"].as_str().unwrap_or_default();
            Reply::Ack(json!({"params": {
                "id": format!("c-{producer_id}"),
                "producerId": producer_id,
                "kind": "audio",
                "rtpParameters": {}
            }}))
        });
        server.reply(events::JOIN_ROOM, json!({"ok": true}));
        server
    }

    pub(crate) fn channel(self: &Arc<Self>) -> SignalingChannel {
        SignalingChannel::new(Arc::clone(self) as Arc<dyn SignalingTransport>)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub(crate) fn respond<F>(&self, event: &str, f: F)
    where
        F: Fn(&Value) -> Reply + Send + Sync + 'static,
    {
        self.responders.lock().insert(event.to_string(), Box::new(f));
    }

    pub(crate) fn reply(&self, event: &str, ack: Value) {
        self.respond(event, move |_| Reply::Ack(ack.clone()));
    }

    pub(crate) fn never(&self, event: &str) {
        self.respond(event, |_| Reply::Never);
    }

    /// Hold acknowledgements of `event` until the returned gate gets permits.
    pub(crate) fn gate(&self, event: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        let held = Arc::clone(&gate);
        let ack = self.current_ack(event);
        self.respond(event, move |payload| {
            Reply::Gated(Arc::clone(&held), ack(payload))
        });
        gate
    }

    fn current_ack(&self, event: &str) -> Box<dyn Fn(&Value) -> Value + Send + Sync> {
        let previous = self.responders.lock().remove(event);
        match previous {
            Some(responder) => Box::new(move |payload| match responder(payload) {
                Reply::Ack(v) | Reply::Gated(_, v) => v,
                Reply::Never => json!({}),
            }),
            None => Box::new(|_| json!({})),
        }
    }

    pub(crate) fn push(&self, event: &str, payload: Value) {
        let _ = self.events.send(SignalingEvent::Push {
            event: event.to_string(),
            payload,
        });
    }

    /// Requested event names, in order.
    pub(crate) fn call_events(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(e, _)| e.clone()).collect()
    }

    pub(crate) fn call_count(&self, event: &str) -> usize {
        self.calls.lock().iter().filter(|(e, _)| e == event).count()
    }

    pub(crate) fn calls_of(&self, event: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub(crate) fn emitted(&self, event: &str) -> Vec<Value> {
        self.emits
            .lock()
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl SignalingTransport for FakeSignaling {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn request(&self, event: &str, payload: Value) -> Result<Value, SignalingError> {
        self.calls.lock().push((event.to_string(), payload.clone()));
        let reply = match self.responders.lock().get(event) {
            Some(responder) => responder(&payload),
            None => Reply::Ack(json!({})),
        };
        match reply {
            Reply::Ack(ack) => Ok(ack),
            Reply::Never => std::future::pending().await,
            Reply::Gated(gate, ack) => {
                let _permit = gate.acquire().await.map_err(|_| SignalingError::ConnectionLost {
                    event: event.to_string(),
                })?;
                Ok(ack)
            }
        }
    }

    fn emit(&self, event: &str, payload: Value) -> Result<(), SignalingError> {
        self.emits.lock().push((event.to_string(), payload));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalingEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

pub(crate) const DEVICE: &str = "device";
pub(crate) const RECV_TRANSPORT: &str = "recv-transport";
pub(crate) const SEND_TRANSPORT: &str = "send-transport";
pub(crate) const PRODUCER: &str = "producer";
pub(crate) const CONSUMER: &str = "consumer";
pub(crate) const PLAYBACK: &str = "playback";
pub(crate) const MICROPHONE: &str = "microphone";

/// Counts handle creation, liveness and lifecycle calls by kind.
#[derive(Default)]
pub(crate) struct Ledger {
    created: Mutex<HashMap<&'static str, usize>>,
    live: Mutex<HashMap<&'static str, usize>>,
    calls: Mutex<HashMap<String, usize>>,
    consumed: Mutex<Vec<String>>,
}

impl Ledger {
    pub(crate) fn created(&self, kind: &str) -> usize {
        self.created.lock().get(kind).copied().unwrap_or(0)
    }

    pub(crate) fn live(&self, kind: &str) -> usize {
        self.live.lock().get(kind).copied().unwrap_or(0)
    }

    /// Number of `call` invocations on handles of `kind`, e.g. ("playback", "detach").
    pub(crate) fn calls(&self, kind: &str, call: &str) -> usize {
        self.calls
            .lock()
            .get(&format!("{kind}.{call}"))
            .copied()
            .unwrap_or(0)
    }

    /// Producer ids in the order their consumers were created.
    pub(crate) fn consumed(&self) -> Vec<String> {
        self.consumed.lock().clone()
    }

    fn record(&self, kind: &str, call: &str) {
        *self.calls.lock().entry(format!("{kind}.{call}")).or_default() += 1;
    }
}

/// Liveness token held by every fake handle.
struct Live {
    ledger: Arc<Ledger>,
    kind: &'static str,
}

impl Live {
    fn new(ledger: &Arc<Ledger>, kind: &'static str) -> Self {
        *ledger.created.lock().entry(kind).or_default() += 1;
        *ledger.live.lock().entry(kind).or_default() += 1;
        Self {
            ledger: Arc::clone(ledger),
            kind,
        }
    }

    fn record(&self, call: &str) {
        self.ledger.record(self.kind, call);
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        if let Some(n) = self.ledger.live.lock().get_mut(self.kind) {
            *n = n.saturating_sub(1);
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeMedia {
    pub(crate) ledger: Arc<Ledger>,
    deny_microphone: AtomicBool,
    no_audio_track: AtomicBool,
    level: Level,
}

impl FakeMedia {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn deny_microphone(&self) {
        self.deny_microphone.store(true, Ordering::Release);
    }

    pub(crate) fn without_audio_track(&self) {
        self.no_audio_track.store(true, Ordering::Release);
    }

    /// Level reported by every microphone meter.
    pub(crate) fn mic_level(&self) -> Level {
        self.level.clone()
    }
}

#[async_trait]
impl MediaEngine for FakeMedia {
    async fn load_device(&self, router_capabilities: &Value) -> MediaResult<Box<dyn MediaDevice>> {
        Ok(Box::new(FakeDevice {
            capabilities: router_capabilities.clone(),
            ledger: Arc::clone(&self.ledger),
            _live: Live::new(&self.ledger, DEVICE),
        }))
    }

    async fn open_microphone(
        &self,
        constraints: AudioConstraints,
    ) -> MediaResult<Box<dyn MicrophoneStream>> {
        if self.deny_microphone.load(Ordering::Acquire) {
            return Err(MediaError::AccessDenied("permission denied".into()));
        }
        assert!(constraints.echo_cancellation && constraints.noise_suppression);
        let track = (!self.no_audio_track.load(Ordering::Acquire)).then(|| MediaTrack::audio("mic-0"));
        Ok(Box::new(FakeMicrophone {
            track,
            level: self.level.clone(),
            live: Live::new(&self.ledger, MICROPHONE),
        }))
    }

    fn create_playback(
        &self,
        _track: &MediaTrack,
        volume: f32,
    ) -> MediaResult<Box<dyn PlaybackElement>> {
        assert_eq!(volume, 1.0);
        Ok(Box::new(FakePlayback {
            live: Live::new(&self.ledger, PLAYBACK),
        }))
    }
}

struct FakeDevice {
    capabilities: Value,
    ledger: Arc<Ledger>,
    _live: Live,
}

impl MediaDevice for FakeDevice {
    fn rtp_capabilities(&self) -> Value {
        self.capabilities.clone()
    }

    fn create_recv_transport(
        &self,
        params: &TransportParams,
        listener: Arc<dyn TransportListener>,
    ) -> MediaResult<Box<dyn RecvTransport>> {
        Ok(Box::new(FakeTransport::new(params, listener, &self.ledger, RECV_TRANSPORT)))
    }

    fn create_send_transport(
        &self,
        params: &TransportParams,
        listener: Arc<dyn TransportListener>,
    ) -> MediaResult<Box<dyn SendTransport>> {
        Ok(Box::new(FakeTransport::new(params, listener, &self.ledger, SEND_TRANSPORT)))
    }
}

struct FakeTransport {
    id: String,
    listener: Arc<dyn TransportListener>,
    connected: AtomicBool,
    ledger: Arc<Ledger>,
    live: Live,
}

impl FakeTransport {
    fn new(
        params: &TransportParams,
        listener: Arc<dyn TransportListener>,
        ledger: &Arc<Ledger>,
        kind: &'static str,
    ) -> Self {
        Self {
            id: params.id.clone(),
            listener,
            connected: AtomicBool::new(false),
            ledger: Arc::clone(ledger),
            live: Live::new(ledger, kind),
        }
    }

    /// Runs the DTLS handshake through the listener on first use.
    async fn ensure_connected(&self) -> MediaResult<()> {
        if self.connected.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.listener
            .on_connect(&self.id, json!({"role": "client", "fingerprints": []}))
            .await?;
        self.listener
            .on_connection_state(&self.id, TransportState::Connected);
        Ok(())
    }
}

#[async_trait]
impl SendTransport for FakeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(&self, track: MediaTrack) -> MediaResult<Box<dyn Producer>> {
        self.ensure_connected().await?;
        let id = self
            .listener
            .on_produce(&self.id, track.kind, json!({"codecs": [], "encodings": []}))
            .await?;
        Ok(Box::new(FakeProducer {
            id,
            paused: AtomicBool::new(false),
            live: Live::new(&self.ledger, PRODUCER),
        }))
    }

    fn close(&self) -> MediaResult<()> {
        self.live.record("close");
        Ok(())
    }
}

#[async_trait]
impl RecvTransport for FakeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn consume(&self, params: ConsumerParams) -> MediaResult<Box<dyn Consumer>> {
        self.ensure_connected().await?;
        self.ledger.consumed.lock().push(params.producer_id.clone());
        Ok(Box::new(FakeConsumer {
            id: params.id,
            producer_id: params.producer_id,
            kind: params.kind,
            live: Live::new(&self.ledger, CONSUMER),
        }))
    }

    fn close(&self) -> MediaResult<()> {
        self.live.record("close");
        Ok(())
    }
}

struct FakeProducer {
    id: String,
    paused: AtomicBool,
    live: Live,
}

#[async_trait]
impl Producer for FakeProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    async fn pause(&self) -> MediaResult<()> {
        self.paused.store(true, Ordering::Release);
        self.live.record("pause");
        Ok(())
    }

    async fn resume(&self) -> MediaResult<()> {
        self.paused.store(false, Ordering::Release);
        self.live.record("resume");
        Ok(())
    }

    fn close(&self) -> MediaResult<()> {
        self.live.record("close");
        Ok(())
    }
}

struct FakeConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    live: Live,
}

impl Consumer for FakeConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn producer_id(&self) -> &str {
        &self.producer_id
    }

    fn track(&self) -> MediaTrack {
        MediaTrack {
            id: format!("track-{}", self.id),
            kind: self.kind,
        }
    }

    fn close(&self) -> MediaResult<()> {
        self.live.record("close");
        Ok(())
    }
}

struct FakeMicrophone {
    track: Option<MediaTrack>,
    level: Level,
    live: Live,
}

impl MicrophoneStream for FakeMicrophone {
    fn audio_track(&self) -> Option<MediaTrack> {
        self.track.clone()
    }

    fn level_meter(&self, _bins: usize) -> MediaResult<Box<dyn LevelMeter>> {
        let mut meter = FakeMeter::new();
        meter.level = self.level.clone();
        Ok(Box::new(meter))
    }

    fn stop(&self) {
        self.live.record("stop");
    }
}

struct FakePlayback {
    live: Live,
}

impl PlaybackElement for FakePlayback {
    fn pause(&self) {
        self.live.record("pause");
    }

    fn detach(&self) {
        self.live.record("detach");
    }
}

// ---------------------------------------------------------------------------
// Level meter
// ---------------------------------------------------------------------------

/// Shared amplitude, `0.0..=1.0`.
#[derive(Clone, Default)]
pub(crate) struct Level(Arc<AtomicU32>);

impl Level {
    pub(crate) fn set(&self, level: f32) {
        self.0.store(level.to_bits(), Ordering::Release);
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }
}

#[derive(Clone, Default)]
pub(crate) struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// Meter whose every bin reads the shared level.
pub(crate) struct FakeMeter {
    level: Level,
    disconnects: Counter,
}

impl FakeMeter {
    pub(crate) fn new() -> Self {
        Self {
            level: Level::default(),
            disconnects: Counter::default(),
        }
    }

    pub(crate) fn level_handle(&self) -> Level {
        self.level.clone()
    }

    pub(crate) fn disconnect_count(&self) -> Counter {
        self.disconnects.clone()
    }
}

impl LevelMeter for FakeMeter {
    fn sample(&mut self, bins: &mut [u8]) {
        let value = (self.level.get().clamp(0.0, 1.0) * 255.0) as u8;
        bins.fill(value);
    }

    fn disconnect(&mut self) {
        self.disconnects.0.fetch_add(1, Ordering::AcqRel);
    }
}
