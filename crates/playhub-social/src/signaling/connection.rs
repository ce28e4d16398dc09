//! WebSocket transport with heartbeats and auto-reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use playhub_common::new_correlation_id;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SignalingError;

use super::channel::SignalingTransport;
use super::handler::{fail_pending, handle_frame, PendingAcks};
use super::types::{Envelope, SignalingCommand, SignalingConfig, SignalingEvent};

const EVENT_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

// ---------------------------------------------------------------------------
// Transport handle
// ---------------------------------------------------------------------------

/// WebSocket signaling transport.
///
/// Owns a background connection task; dropping the handle (or calling
/// [`disconnect`](Self::disconnect)) shuts it down.
pub struct WsSignaling {
    command_tx: mpsc::UnboundedSender<SignalingCommand>,
    connected: Arc<AtomicBool>,
    event_tx: broadcast::Sender<SignalingEvent>,
    pending: PendingAcks,
    shutdown: CancellationToken,
}

impl WsSignaling {
    /// Start the background connection. Must be called inside a tokio runtime.
    pub fn connect(config: SignalingConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let connected = Arc::new(AtomicBool::new(false));
        let pending: PendingAcks = Arc::new(SyncMutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let link = Link {
            config,
            connected: Arc::clone(&connected),
            event_tx: event_tx.clone(),
            pending: Arc::clone(&pending),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(connection_loop(link, command_rx));

        Self {
            command_tx,
            connected,
            event_tx,
            pending,
            shutdown,
        }
    }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&self) {
        let _ = self.command_tx.send(SignalingCommand::Disconnect);
        self.shutdown.cancel();
    }
}

impl Drop for WsSignaling {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Removes a waiter when its request future is dropped (timeout or cancel).
struct AckGuard {
    pending: PendingAcks,
    msg_ref: String,
}

impl Drop for AckGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.msg_ref);
    }
}

#[async_trait]
impl SignalingTransport for WsSignaling {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn request(&self, event: &str, payload: Value) -> Result<Value, SignalingError> {
        let msg_ref = next_ref();
        let (waiter, answer) = oneshot::channel();
        self.pending.lock().insert(msg_ref.clone(), waiter);
        let _guard = AckGuard {
            pending: Arc::clone(&self.pending),
            msg_ref: msg_ref.clone(),
        };

        let envelope = Envelope {
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
        };
        self.command_tx
            .send(SignalingCommand::Send(envelope))
            .map_err(|_| SignalingError::NotConnected)?;

        answer.await.map_err(|_| SignalingError::ConnectionLost {
            event: event.to_string(),
        })
    }

    fn emit(&self, event: &str, payload: Value) -> Result<(), SignalingError> {
        let envelope = Envelope {
            event: event.to_string(),
            payload,
            msg_ref: None,
        };
        self.command_tx
            .send(SignalingCommand::Send(envelope))
            .map_err(|_| SignalingError::NotConnected)
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalingEvent> {
        self.event_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// State shared between the handle and the background task.
struct Link {
    config: SignalingConfig,
    connected: Arc<AtomicBool>,
    event_tx: broadcast::Sender<SignalingEvent>,
    pending: PendingAcks,
    shutdown: CancellationToken,
}

/// Build the upgrade request with auth and identity headers.
pub(crate) fn build_request(config: &SignalingConfig) -> Result<Request, String> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| format!("invalid signaling url: {e}"))?;
    let headers = request.headers_mut();

    if let Some(token) = &config.access_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| format!("invalid access token: {e}"))?;
        headers.insert(AUTHORIZATION, value);
    }
    for (name, value) in [
        ("x-playhub-user-id", &config.user_id),
        ("x-playhub-user-name", &config.display_name),
    ] {
        let Some(value) = value else { continue };
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(_) => warn!(header = name, "identity value is not a valid header, skipped"),
        }
    }

    Ok(request)
}

async fn connection_loop(link: Link, command_rx: mpsc::UnboundedReceiver<SignalingCommand>) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let conn = new_correlation_id();
    let mut reconnect_delay = link.config.reconnect_delay;

    loop {
        let request = match build_request(&link.config) {
            Ok(request) => request,
            Err(message) => {
                error!(conn = %conn, "{message}");
                let _ = link.event_tx.send(SignalingEvent::Error(message));
                return;
            }
        };

        info!(conn = %conn, url = %link.config.url, "connecting to signaling server");
        let attempt = tokio::time::timeout(
            link.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        );
        let outcome = tokio::select! {
            _ = link.shutdown.cancelled() => return,
            outcome = attempt => outcome,
        };

        match outcome {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = link.config.reconnect_delay;
                link.connected.store(true, Ordering::Release);
                let _ = link.event_tx.send(SignalingEvent::Connected);
                info!(conn = %conn, "signaling connected");

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    link.config.heartbeat_interval,
                ));
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    link.shutdown.clone(),
                ));

                loop {
                    let next = tokio::select! {
                        _ = link.shutdown.cancelled() => None,
                        msg = ws_read.next() => msg,
                    };
                    match next {
                        Some(Ok(WsMessage::Text(text))) => {
                            handle_frame(&text, &link.pending, &link.event_tx);
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!(conn = %conn, "signaling server closed connection");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(conn = %conn, error = %e, "websocket error");
                            break;
                        }
                        Some(Ok(_)) => {}
                        None => break,
                    }
                }

                heartbeat_handle.abort();
                cmd_handle.abort();
                link.connected.store(false, Ordering::Release);
                let lost = fail_pending(&link.pending);
                let _ = link.event_tx.send(SignalingEvent::Disconnected);
                info!(conn = %conn, unanswered = lost, "signaling disconnected");

                if link.shutdown.is_cancelled() {
                    let _ = ws_write.lock().await.send(WsMessage::Close(None)).await;
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(conn = %conn, error = %e, "failed to connect to signaling server");
                let _ = link
                    .event_tx
                    .send(SignalingEvent::Error(format!("connection failed: {e}")));
            }
            Err(_elapsed) => {
                error!(
                    conn = %conn,
                    timeout_secs = link.config.connect_timeout.as_secs(),
                    "signaling connection timed out"
                );
                let _ = link.event_tx.send(SignalingEvent::Error(format!(
                    "connection timed out after {:?}",
                    link.config.connect_timeout
                )));
            }
        }

        drop_offline_commands(&command_rx, &link).await;
        if link.shutdown.is_cancelled() {
            return;
        }

        info!(conn = %conn, delay_secs = reconnect_delay.as_secs(), "reconnecting");
        tokio::select! {
            _ = link.shutdown.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
        reconnect_delay = (reconnect_delay * 2).min(link.config.max_reconnect_delay);
    }
}

/// Commands queued while the link was down are stale by the time it
/// comes back; fail their waiters now.
async fn drop_offline_commands(
    command_rx: &Arc<Mutex<mpsc::UnboundedReceiver<SignalingCommand>>>,
    link: &Link,
) {
    let mut rx = command_rx.lock().await;
    while let Ok(command) = rx.try_recv() {
        match command {
            SignalingCommand::Send(envelope) => {
                if let Some(msg_ref) = &envelope.msg_ref {
                    link.pending.lock().remove(msg_ref);
                }
                debug!(event = %envelope.event, "dropped while offline");
            }
            SignalingCommand::Disconnect => link.shutdown.cancel(),
        }
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval: Duration)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let mut writer = ws_write.lock().await;
        if writer.send(WsMessage::Ping(Default::default())).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    command_rx: Arc<Mutex<mpsc::UnboundedReceiver<SignalingCommand>>>,
    ws_write: Arc<Mutex<S>>,
    shutdown: CancellationToken,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = command_rx.lock().await;
    while let Some(command) = rx.recv().await {
        match command {
            SignalingCommand::Send(envelope) => {
                let json = match serde_json::to_string(&envelope) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(event = %envelope.event, error = %e, "failed to encode frame");
                        continue;
                    }
                };
                let mut writer = ws_write.lock().await;
                if writer.send(WsMessage::Text(json.into())).await.is_err() {
                    warn!(event = %envelope.event, "failed to write frame");
                    break;
                }
            }
            SignalingCommand::Disconnect => {
                let mut writer = ws_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                shutdown.cancel();
                return;
            }
        }
    }
}
