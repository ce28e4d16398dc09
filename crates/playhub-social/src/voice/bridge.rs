//! Routes transport negotiation callbacks onto the signaling channel.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::SignalingError;
use crate::protocol::{ConnectTransport, MediaKind, Produce};
use crate::signaling::SignalingChannel;

use super::media::{TransportListener, TransportState};

pub(crate) struct SignalingBridge {
    channel: SignalingChannel,
    room_id: String,
    cancel: CancellationToken,
}

impl SignalingBridge {
    pub(crate) fn new(channel: SignalingChannel, room_id: String, cancel: CancellationToken) -> Self {
        Self {
            channel,
            room_id,
            cancel,
        }
    }
}

#[async_trait]
impl TransportListener for SignalingBridge {
    async fn on_connect(
        &self,
        transport_id: &str,
        dtls_parameters: Value,
    ) -> Result<(), SignalingError> {
        let request = ConnectTransport {
            room_id: self.room_id.clone(),
            transport_id: transport_id.to_string(),
            dtls_parameters,
        };
        self.channel.request(&request, Some(&self.cancel)).await?;
        debug!(room_id = %self.room_id, transport_id, "transport connected");
        Ok(())
    }

    async fn on_produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<String, SignalingError> {
        let request = Produce {
            room_id: self.room_id.clone(),
            transport_id: transport_id.to_string(),
            kind,
            rtp_parameters,
        };
        let ack = self.channel.request(&request, Some(&self.cancel)).await?;
        debug!(room_id = %self.room_id, transport_id, producer_id = %ack.id, "producer registered");
        Ok(ack.id)
    }

    fn on_connection_state(&self, transport_id: &str, state: TransportState) {
        match state {
            TransportState::Failed | TransportState::Disconnected => {
                error!(room_id = %self.room_id, transport_id, ?state, "transport connection failed");
            }
            _ => debug!(room_id = %self.room_id, transport_id, ?state, "transport state changed"),
        }
    }
}
