//! The signed-in user, as seen by the realtime layer.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Identity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Source of the local identity. Authentication itself lives elsewhere;
/// this only answers "who is signed in" and asks for a login prompt.
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;

    /// Ask the host application to show its login prompt. `action`
    /// names what the user was trying to do (e.g. "join voice").
    fn request_login(&self, action: &str);
}

/// Fixed identity, for the CLI and tests.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    identity: Option<Identity>,
    login_requests: AtomicUsize,
}

impl StaticIdentity {
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            login_requests: AtomicUsize::new(0),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// How many times a login prompt was requested.
    pub fn login_requests(&self) -> usize {
        self.login_requests.load(Ordering::Relaxed)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current(&self) -> Option<Identity> {
        self.identity.clone()
    }

    fn request_login(&self, action: &str) {
        self.login_requests.fetch_add(1, Ordering::Relaxed);
        warn!(action, "sign in required");
    }
}
