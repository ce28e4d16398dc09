use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Short hex tag for correlating log lines of one connection or attempt.
pub fn new_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// Key of a shared room session, derived from the context it belongs to
/// (for example `game:42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn for_game(game_id: impl fmt::Display) -> Self {
        Self(format!("game:{game_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RoomKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
