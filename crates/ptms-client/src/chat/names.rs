//! Session-scoped display-name cache.

use std::collections::HashMap;

use tracing::{debug, warn};

use ptms_net::PtmsApi;
use ptms_shared::types::{ChatUser, UserId};

#[derive(Debug, Clone, Default)]
pub struct NameCache {
    names: HashMap<UserId, String>,
}

impl NameCache {
    pub fn from_users(users: impl IntoIterator<Item = ChatUser>) -> Self {
        let names = users
            .into_iter()
            .filter(|u| !u.display_name.trim().is_empty())
            .map(|u| (u.id, u.display_name))
            .collect();
        Self { names }
    }

    /// Bulk-load the chat directory. A failed load yields an empty cache;
    /// names then fall back to the placeholder.
    pub async fn load<A: PtmsApi + ?Sized>(api: &A, token: &str) -> Self {
        match api.fetch_chat_users(token).await {
            Ok(users) => {
                let cache = Self::from_users(users);
                debug!(count = cache.len(), "Loaded chat directory");
                cache
            }
            Err(e) => {
                warn!(error = %e, "Failed to load chat directory");
                Self::default()
            }
        }
    }

    /// Display name for `id`, or `User #<id>` when unknown.
    pub fn display_name(&self, id: UserId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.placeholder_name())
    }

    pub fn insert(&mut self, id: UserId, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
