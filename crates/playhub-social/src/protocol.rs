//! Signaling protocol for voice and chat.
//!
//! Every outbound operation is a typed message carrying its event name;
//! requests also name the acknowledgement they expect. Inbound voice
//! events are parsed into one variant per event name with a fixed field
//! set, and payloads missing a required field are rejected.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SignalingError;
use crate::voice::{Participant, ProducerAnnouncement};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub mod events {
    /// Acknowledgement frame correlated by `ref`.
    pub const ACK: &str = "ack";

    pub const VOICE_JOIN: &str = "voice-join";
    pub const GET_RTP_CAPABILITIES: &str = "getRtpCapabilities";
    pub const CREATE_TRANSPORT: &str = "createTransport";
    pub const CONNECT_TRANSPORT: &str = "connect-transport";
    pub const PRODUCE: &str = "produce";
    pub const CONSUME: &str = "consume";
    pub const VOICE_LEAVE: &str = "voice-leave";
    pub const VOICE_SPEAKING: &str = "voice-speaking";

    pub const ROSTER_SNAPSHOT: &str = "roster-snapshot";
    pub const PRODUCER_ANNOUNCED: &str = "producer-announced";
    pub const PEER_LEFT: &str = "peer-left";
    pub const PRODUCER_CLOSED: &str = "producer-closed";
    pub const SPEAKING_UPDATE: &str = "speaking-update";

    pub const JOIN_ROOM: &str = "join-room";
    pub const LEAVE_ROOM: &str = "leave-room";
    pub const SEND_MSG: &str = "send-msg";
    pub const MESSAGE: &str = "message";
    pub const CHAT_HISTORY: &str = "chat-history";
}

// ---------------------------------------------------------------------------
// Message traits
// ---------------------------------------------------------------------------

/// An outbound message with a fixed event name.
pub trait SignalingMessage: Serialize {
    const EVENT: &'static str;
}

/// An outbound message the server acknowledges with `Response`.
pub trait SignalingRequest: SignalingMessage {
    type Response: DeserializeOwned;
}

macro_rules! message {
    ($ty:ty, $event:expr) => {
        impl SignalingMessage for $ty {
            const EVENT: &'static str = $event;
        }
    };
    ($ty:ty, $event:expr, $resp:ty) => {
        message!($ty, $event);
        impl SignalingRequest for $ty {
            type Response = $resp;
        }
    };
}

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Relay-issued transport parameters. Only the id is interpreted here;
/// ICE/DTLS fields are handed to the media engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportParams {
    pub id: String,
    #[serde(flatten)]
    pub negotiation: Map<String, Value>,
}

/// Relay-issued consumer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerParams {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub rtp_parameters: Value,
}

// ---------------------------------------------------------------------------
// Voice requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct VoiceJoin {
    pub target: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceJoinAck {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRtpCapabilities {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilitiesAck {
    pub rtp_capabilities: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransport {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransportAck {
    pub params: TransportParams,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransport {
    pub room_id: String,
    pub transport_id: String,
    pub dtls_parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Produce {
    pub room_id: String,
    pub transport_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProduceAck {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consume {
    pub room_id: String,
    pub recv_transport_id: String,
    pub producer_id: String,
    pub rtp_capabilities: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumeAck {
    pub params: ConsumerParams,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceLeave {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSpeaking {
    pub room_id: String,
    pub speaking: bool,
}

message!(VoiceJoin, events::VOICE_JOIN, VoiceJoinAck);
message!(GetRtpCapabilities, events::GET_RTP_CAPABILITIES, RtpCapabilitiesAck);
message!(CreateTransport, events::CREATE_TRANSPORT, CreateTransportAck);
message!(ConnectTransport, events::CONNECT_TRANSPORT, IgnoredAny);
message!(Produce, events::PRODUCE, ProduceAck);
message!(Consume, events::CONSUME, ConsumeAck);
message!(VoiceLeave, events::VOICE_LEAVE);
message!(VoiceSpeaking, events::VOICE_SPEAKING);

// ---------------------------------------------------------------------------
// Chat requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinRoomAck {
    #[serde(default)]
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoom {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub room_id: String,
    pub text: String,
    pub client_id: String,
}

message!(JoinRoom, events::JOIN_ROOM, JoinRoomAck);
message!(LeaveRoom, events::LEAVE_ROOM, IgnoredAny);
message!(SendMessage, events::SEND_MSG, IgnoredAny);

// ---------------------------------------------------------------------------
// Inbound voice events
// ---------------------------------------------------------------------------

/// Server-initiated voice events.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceServerEvent {
    RosterSnapshot { participants: Vec<Participant> },
    ProducerAnnounced(ProducerAnnouncement),
    PeerLeft { peer_id: String },
    ProducerClosed { producer_id: String },
    SpeakingUpdate { peer_id: String, speaking: bool },
}

#[derive(Deserialize)]
struct RosterPayload {
    participants: Vec<Participant>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerPayload {
    peer_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProducerPayload {
    producer_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeakingPayload {
    peer_id: String,
    speaking: bool,
}

fn decode<T: DeserializeOwned>(event: &str, payload: &Value) -> Result<T, SignalingError> {
    T::deserialize(payload).map_err(|e| SignalingError::Malformed {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

impl VoiceServerEvent {
    /// Parse a server push. `Ok(None)` means the event is not a voice event.
    pub fn parse(event: &str, payload: &Value) -> Result<Option<Self>, SignalingError> {
        let parsed = match event {
            events::ROSTER_SNAPSHOT => {
                let p: RosterPayload = decode(event, payload)?;
                Self::RosterSnapshot {
                    participants: p.participants,
                }
            }
            events::PRODUCER_ANNOUNCED => Self::ProducerAnnounced(decode(event, payload)?),
            events::PEER_LEFT => {
                let p: PeerPayload = decode(event, payload)?;
                Self::PeerLeft { peer_id: p.peer_id }
            }
            events::PRODUCER_CLOSED => {
                let p: ProducerPayload = decode(event, payload)?;
                Self::ProducerClosed {
                    producer_id: p.producer_id,
                }
            }
            events::SPEAKING_UPDATE => {
                let p: SpeakingPayload = decode(event, payload)?;
                Self::SpeakingUpdate {
                    peer_id: p.peer_id,
                    speaking: p.speaking,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

/// The `roomId` a push is addressed to, when the server includes one.
pub fn payload_room_id(payload: &Value) -> Option<&str> {
    payload.get("roomId").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_payloads_use_camel_case() {
        let consume = Consume {
            room_id: "r1".into(),
            recv_transport_id: "t-1".into(),
            producer_id: "p1".into(),
            rtp_capabilities: json!({"codecs": []}),
        };
        assert_eq!(
            serde_json::to_value(&consume).unwrap(),
            json!({
                "roomId": "r1",
                "recvTransportId": "t-1",
                "producerId": "p1",
                "rtpCapabilities": {"codecs": []}
            })
        );
        assert_eq!(Consume::EVENT, "consume");
    }

    #[test]
    fn transport_params_keep_negotiation_fields() {
        let ack: CreateTransportAck = serde_json::from_value(json!({
            "params": {"id": "t-9", "iceParameters": {"usernameFragment": "x"}, "dtlsParameters": {}}
        }))
        .unwrap();
        assert_eq!(ack.params.id, "t-9");
        assert!(ack.params.negotiation.contains_key("iceParameters"));
        assert!(!ack.params.negotiation.contains_key("id"));
    }

    #[test]
    fn parses_producer_announcement_with_default_name() {
        let ev = VoiceServerEvent::parse(
            events::PRODUCER_ANNOUNCED,
            &json!({"producerId": "p1", "peerId": "P"}),
        )
        .unwrap()
        .unwrap();
        match ev {
            VoiceServerEvent::ProducerAnnounced(a) => {
                assert_eq!(a.producer_id, "p1");
                assert_eq!(a.peer_id, "P");
                assert_eq!(a.display_name, "User");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn parses_roster_snapshot() {
        let ev = VoiceServerEvent::parse(
            events::ROSTER_SNAPSHOT,
            &json!({"participants": [
                {"peerId": "a", "displayName": "Ann", "muted": true, "speaking": false},
                {"peerId": "b"}
            ]}),
        )
        .unwrap()
        .unwrap();
        let VoiceServerEvent::RosterSnapshot { participants } = ev else {
            panic!("expected roster snapshot");
        };
        assert_eq!(participants.len(), 2);
        assert!(participants[0].muted);
        assert_eq!(participants[1].display_name, "User");
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = VoiceServerEvent::parse(events::SPEAKING_UPDATE, &json!({"peerId": "a"}))
            .unwrap_err();
        assert!(matches!(err, SignalingError::Malformed { ref event, .. } if event == "speaking-update"));

        let err = VoiceServerEvent::parse(events::PEER_LEFT, &json!({"socketId": "a"})).unwrap_err();
        assert!(matches!(err, SignalingError::Malformed { .. }));
    }

    #[test]
    fn rejects_wrong_field_type() {
        let err = VoiceServerEvent::parse(
            events::PRODUCER_CLOSED,
            &json!({"producerId": 17}),
        )
        .unwrap_err();
        assert!(matches!(err, SignalingError::Malformed { .. }));
    }

    #[test]
    fn unknown_events_are_not_voice_events() {
        assert_eq!(VoiceServerEvent::parse("message", &json!({})).unwrap(), None);
    }

    #[test]
    fn room_id_extraction() {
        assert_eq!(payload_room_id(&json!({"roomId": "r1"})), Some("r1"));
        assert_eq!(payload_room_id(&json!({"peerId": "x"})), None);
    }
}
