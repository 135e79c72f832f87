use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::UNKNOWN_USER_PREFIX;

// Server-assigned numeric user id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Deterministic label rendered when no display name is known.
    pub fn placeholder_name(&self) -> String {
        format!("{UNKNOWN_USER_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The signed-in user's profile as returned by the login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Token plus profile obtained from a successful online login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkType {
    pub id: i64,
    pub name: String,
}

/// A submitted time entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeReport {
    pub id: i64,
    pub owner_id: UserId,
    pub project_id: i64,
    pub work_type_id: i64,
    pub work_date: NaiveDate,
    pub hours: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Directory entry used to resolve chat display names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatUser {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRoom {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub unread_count: u32,
}

/// Chat connection lifecycle. Variants are ordered: the machine only moves
/// forward, except that `Disconnected` is reachable from anywhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        match next {
            ConnectionState::Disconnected => true,
            ConnectionState::Connecting => self == ConnectionState::Disconnected,
            ConnectionState::Connected => self == ConnectionState::Connecting,
            ConnectionState::Authenticated => self == ConnectionState::Connected,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_uses_numeric_id() {
        assert_eq!(UserId(9).placeholder_name(), "User #9");
    }

    #[test]
    fn connection_moves_forward_only() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Authenticated));
        assert!(Authenticated.can_transition_to(Disconnected));
        assert!(Connecting.can_transition_to(Disconnected));

        assert!(!Authenticated.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Authenticated));
        assert!(!Connected.can_transition_to(Connecting));
    }

    #[test]
    fn identity_defaults_optional_fields() {
        let json = r#"{"user_id": 3, "display_name": "Ana", "email": "ana@ptms.io"}"#;
        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.user_id, UserId(3));
        assert!(identity.active);
        assert!(identity.role.is_none());
    }
}
