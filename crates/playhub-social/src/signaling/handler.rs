//! Incoming frame routing: acknowledgements to their waiters, everything
//! else onto the event stream.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::protocol::events;

use super::types::{Envelope, SignalingEvent};

/// Waiters for acknowledgements, keyed by request `ref`.
pub(crate) type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

/// Handle one text frame from the server.
pub(crate) fn handle_frame(
    text: &str,
    pending: &PendingAcks,
    event_tx: &broadcast::Sender<SignalingEvent>,
) {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "unrecognized frame from signaling server");
            return;
        }
    };

    if envelope.event == events::ACK {
        let Some(msg_ref) = envelope.msg_ref else {
            warn!("acknowledgement without ref");
            return;
        };
        match pending.lock().remove(&msg_ref) {
            Some(waiter) => {
                let _ = waiter.send(envelope.payload);
            }
            None => debug!(msg_ref = %msg_ref, "late or unknown acknowledgement"),
        }
        return;
    }

    debug!(event = %envelope.event, "server push");
    let _ = event_tx.send(SignalingEvent::Push {
        event: envelope.event,
        payload: envelope.payload,
    });
}

/// Drop every waiter; their requests resolve as connection lost.
pub(crate) fn fail_pending(pending: &PendingAcks) -> usize {
    let mut waiters = pending.lock();
    let count = waiters.len();
    waiters.clear();
    count
}
