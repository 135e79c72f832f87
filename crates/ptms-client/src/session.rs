//! Observable session value object.
//!
//! [`SessionState`] is owned by the bootstrap manager, the only writer, and
//! published through a `tokio::sync::watch` channel. Screens clone a receiver
//! and read snapshots; they never mutate it.

use ptms_shared::types::{Identity, UserId};
use ptms_store::BootstrapState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// The signed-in user, `None` after logout.
    pub identity: Option<Identity>,
    /// Bearer token of an online session. Offline sessions have none.
    pub token: Option<String>,
    /// Readiness marker as last read or written.
    pub bootstrap: Option<BootstrapState>,
    /// Signed in from the offline credential rather than the server.
    pub offline: bool,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.identity.as_ref().map(|i| i.user_id)
    }

    /// Online sessions can reach the API and the chat gateway.
    pub fn is_online(&self) -> bool {
        self.token.is_some() && !self.offline
    }

    pub fn has_completed_bootstrap(&self) -> bool {
        self.bootstrap
            .as_ref()
            .map(|b| b.has_completed_initial_auth)
            .unwrap_or(false)
    }
}
