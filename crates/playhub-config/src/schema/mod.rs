//! Configuration schema types for the Playhub client.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod chat;
mod identity;
mod signaling;
mod system;
mod voice;

pub use chat::*;
pub use identity::*;
pub use signaling::*;
pub use system::*;
pub use voice::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayhubConfig {
    pub signaling: SignalingSettings,
    pub voice: VoiceSettings,
    pub chat: ChatSettings,
    pub identity: IdentitySettings,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
