//! The request/acknowledge contract over any signaling transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SignalingError;
use crate::protocol::{SignalingMessage, SignalingRequest};

use super::types::SignalingEvent;

/// A persistent bidirectional connection that can correlate
/// acknowledgements with requests.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Send `event` and wait for its acknowledgement payload. No timeout.
    async fn request(&self, event: &str, payload: Value) -> Result<Value, SignalingError>;

    /// Send `event` without expecting an acknowledgement.
    fn emit(&self, event: &str, payload: Value) -> Result<(), SignalingError>;

    fn subscribe(&self) -> broadcast::Receiver<SignalingEvent>;
}

/// Typed request/response over a [`SignalingTransport`].
///
/// Every call fails fast with `NotConnected` when the link is down, gives
/// up with `Timeout` after a fixed bound without retrying, and turns an
/// acknowledgement carrying an `error` field into `Rejected`. Holds no
/// session state; clones share the transport.
#[derive(Clone)]
pub struct SignalingChannel {
    transport: Arc<dyn SignalingTransport>,
    call_timeout: Duration,
}

impl SignalingChannel {
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(transport: Arc<dyn SignalingTransport>) -> Self {
        Self {
            transport,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalingEvent> {
        self.transport.subscribe()
    }

    /// Send `event` and resolve with its acknowledgement payload.
    pub async fn call(&self, event: &str, payload: Value) -> Result<Value, SignalingError> {
        self.call_inner(event, payload, None).await
    }

    /// Like [`call`](Self::call), abandoned with `Cancelled` once `cancel` fires.
    pub async fn call_cancellable(
        &self,
        event: &str,
        payload: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, SignalingError> {
        self.call_inner(event, payload, Some(cancel)).await
    }

    /// Send a typed request and decode its acknowledgement.
    pub async fn request<R: SignalingRequest>(
        &self,
        request: &R,
        cancel: Option<&CancellationToken>,
    ) -> Result<R::Response, SignalingError> {
        let payload = encode(R::EVENT, request)?;
        let ack = self.call_inner(R::EVENT, payload, cancel).await?;
        serde_json::from_value(ack).map_err(|e| SignalingError::Malformed {
            event: R::EVENT.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fire-and-forget a typed message.
    pub fn notify<M: SignalingMessage>(&self, message: &M) -> Result<(), SignalingError> {
        if !self.transport.is_connected() {
            return Err(SignalingError::NotConnected);
        }
        let payload = encode(M::EVENT, message)?;
        self.transport.emit(M::EVENT, payload)
    }

    async fn call_inner(
        &self,
        event: &str,
        payload: Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, SignalingError> {
        if !self.transport.is_connected() {
            return Err(SignalingError::NotConnected);
        }

        let ack = tokio::time::timeout(self.call_timeout, self.transport.request(event, payload));
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(event, "signaling call cancelled");
                    return Err(SignalingError::Cancelled { event: event.to_string() });
                }
                outcome = ack => outcome,
            },
            None => ack.await,
        };

        let payload = match outcome {
            Ok(result) => result?,
            Err(_elapsed) => {
                warn!(event, timeout_ms = self.call_timeout.as_millis() as u64, "no acknowledgement");
                return Err(SignalingError::Timeout {
                    event: event.to_string(),
                    after: self.call_timeout,
                });
            }
        };

        match ack_error(&payload) {
            Some(message) => Err(SignalingError::Rejected {
                event: event.to_string(),
                message,
            }),
            None => Ok(payload),
        }
    }
}

fn encode<T: serde::Serialize>(event: &str, value: &T) -> Result<Value, SignalingError> {
    serde_json::to_value(value).map_err(|e| SignalingError::Malformed {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

/// The message of an acknowledgement's `error` field, if it carries one.
pub(crate) fn ack_error(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(message) => Some(message.clone()),
        other => Some(
            other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}
