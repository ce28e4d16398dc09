//! Text chat settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Messages kept per room before the oldest are dropped (valid range: 10-10000).
    pub max_messages_per_room: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_messages_per_room: 500,
        }
    }
}
