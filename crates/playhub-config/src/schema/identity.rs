//! Local identity used when no session provider is wired in (CLI use).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
}
