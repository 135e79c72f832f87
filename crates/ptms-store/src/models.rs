//! Records persisted in the local cache.
//!
//! Reference data (`Project`, `WorkType`) and `TimeReport` come from
//! `ptms-shared` because the API client produces them too; this module adds
//! the store-only records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ptms_shared::credential::OfflineCredential;
use ptms_shared::types::Identity;

pub use ptms_shared::types::{Project, TimeReport, WorkType};

// ---------------------------------------------------------------------------
// Cache kinds
// ---------------------------------------------------------------------------

/// Reference-data snapshot kinds that support replace-all semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKind {
    Project,
    WorkType,
}

impl CacheKind {
    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            CacheKind::Project => "projects",
            CacheKind::WorkType => "work_types",
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKind::Project => f.write_str("project"),
            CacheKind::WorkType => f.write_str("workType"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap readiness marker
// ---------------------------------------------------------------------------

/// Written once, atomically, when all three bootstrap stages succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapState {
    pub has_completed_initial_auth: bool,
    pub auth_date: DateTime<Utc>,
    /// Email of the user who completed the bootstrap.
    pub owner_identity: String,
    pub cached_project_count: i64,
    pub cached_work_type_count: i64,
    pub cache_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Session and offline profile
// ---------------------------------------------------------------------------

/// Live session persisted across restarts; removed at logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub identity: Identity,
}

/// Offline credential plus the identity it unlocks. Kept after logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineProfile {
    pub credential: OfflineCredential,
    pub identity: Identity,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Base URL both the REST API and the chat gateway are derived from.
    #[serde(default)]
    pub base_url: String,
}
