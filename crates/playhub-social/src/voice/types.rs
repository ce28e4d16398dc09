//! Room state, participants, and session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

pub(crate) const DEFAULT_DISPLAY_NAME: &str = "User";

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}

/// One member of a voice room as shown in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub peer_id: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub speaking: bool,
}

impl Participant {
    pub fn new(peer_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            display_name: display_name.into(),
            muted: false,
            speaking: false,
        }
    }
}

/// A remote producer announced by the server, also the unit held in the
/// pending queue until local transports are ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerAnnouncement {
    pub producer_id: String,
    pub peer_id: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

impl ProducerAnnouncement {
    pub fn new(
        producer_id: impl Into<String>,
        peer_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            producer_id: producer_id.into(),
            peer_id: peer_id.into(),
            display_name: display_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Room state
// ---------------------------------------------------------------------------

/// Shared state of one room, as every observer sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub joined: bool,
    pub mic_on: bool,
    pub participants: Vec<Participant>,
}

impl RoomState {
    pub fn participant(&self, peer_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.peer_id == peer_id)
    }

    /// Insert `participant` unless that peer is already listed. Existing
    /// entries keep their flags.
    pub fn merge_participant(&mut self, participant: Participant) -> bool {
        if self.participant(&participant.peer_id).is_some() {
            return false;
        }
        self.participants.push(participant);
        true
    }

    pub fn update_participant(&mut self, peer_id: &str, f: impl FnOnce(&mut Participant)) -> bool {
        match self.participants.iter_mut().find(|p| p.peer_id == peer_id) {
            Some(p) => {
                f(p);
                true
            }
            None => false,
        }
    }

    pub fn remove_participant(&mut self, peer_id: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.peer_id != peer_id);
        self.participants.len() != before
    }
}

/// Partial update merged into a [`RoomState`]; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStatePatch {
    pub joined: Option<bool>,
    pub mic_on: Option<bool>,
    pub participants: Option<Vec<Participant>>,
}

impl RoomStatePatch {
    pub fn joined(joined: bool, mic_on: bool) -> Self {
        Self {
            joined: Some(joined),
            mic_on: Some(mic_on),
            participants: None,
        }
    }

    pub fn mic_on(mic_on: bool) -> Self {
        Self {
            mic_on: Some(mic_on),
            ..Self::default()
        }
    }

    pub fn participants(participants: Vec<Participant>) -> Self {
        Self {
            participants: Some(participants),
            ..Self::default()
        }
    }

    /// `{joined: false, micOn: false, participants: []}`
    pub fn reset() -> Self {
        Self {
            joined: Some(false),
            mic_on: Some(false),
            participants: Some(Vec::new()),
        }
    }

    pub fn apply(self, state: &mut RoomState) {
        if let Some(joined) = self.joined {
            state.joined = joined;
        }
        if let Some(mic_on) = self.mic_on {
            state.mic_on = mic_on;
        }
        if let Some(participants) = self.participants {
            state.participants = participants;
        }
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle & configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Joining,
    Joined,
    Leaving,
}

/// Microphone processing requested when opening the local stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Tunables for a voice session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub speaking_threshold: f32,
    pub frame_interval: Duration,
    pub analyser_bins: usize,
    pub audio: AudioConstraints,
    pub playback_volume: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            speaking_threshold: 0.02,
            frame_interval: Duration::from_millis(16),
            analyser_bins: 128,
            audio: AudioConstraints::default(),
            playback_volume: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_existing_flags() {
        let mut state = RoomState::default();
        let mut speaking = Participant::new("a", "Ann");
        speaking.speaking = true;
        assert!(state.merge_participant(speaking));
        assert!(!state.merge_participant(Participant::new("a", "Someone else")));
        let a = state.participant("a").unwrap();
        assert!(a.speaking);
        assert_eq!(a.display_name, "Ann");
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut state = RoomState {
            joined: true,
            mic_on: true,
            participants: vec![Participant::new("a", "Ann")],
        };
        RoomStatePatch::mic_on(false).apply(&mut state);
        assert!(state.joined);
        assert!(!state.mic_on);
        assert_eq!(state.participants.len(), 1);

        RoomStatePatch::reset().apply(&mut state);
        assert_eq!(state, RoomState::default());
    }

    #[test]
    fn update_and_remove_participant() {
        let mut state = RoomState::default();
        state.merge_participant(Participant::new("a", "Ann"));
        assert!(state.update_participant("a", |p| p.muted = true));
        assert!(!state.update_participant("zz", |p| p.muted = true));
        assert!(state.participant("a").unwrap().muted);
        assert!(state.remove_participant("a"));
        assert!(!state.remove_participant("a"));
    }

    #[test]
    fn room_state_serializes_camel_case() {
        let state = RoomState {
            joined: true,
            mic_on: true,
            participants: vec![Participant::new("a", "Ann")],
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["micOn"], true);
        assert_eq!(json["participants"][0]["peerId"], "a");
        assert_eq!(json["participants"][0]["displayName"], "Ann");
    }
}
