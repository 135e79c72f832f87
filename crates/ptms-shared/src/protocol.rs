//! Chat gateway wire protocol.
//!
//! Frames are JSON text messages carrying a `type` discriminator. The client
//! sends [`ClientFrame`]s and receives [`ServerFrame`]s; the latter are turned
//! into [`ChatEvent`]s, the exhaustive set of inbound events the rest of the
//! application reacts to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RoomId, UserId};

/// Frames sent from the client to the chat gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Authenticate { token: String },
    Subscribe { room_id: RoomId },
    Unsubscribe { room_id: RoomId },
    SendMessage { room_id: RoomId, body: String },
    Typing { room_id: RoomId, is_typing: bool },
    MarkRead { room_id: RoomId },
    Ping,
}

/// Frames pushed by the chat gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Authenticated {
        user_id: UserId,
    },
    Error {
        message: String,
    },
    Subscribed {
        room_id: RoomId,
    },
    Unsubscribed {
        room_id: RoomId,
    },
    NewMessage {
        room_id: RoomId,
        sender_id: UserId,
        body: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    MessageSent {
        room_id: RoomId,
        message_id: i64,
    },
    Typing {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },
    Presence {
        user_id: UserId,
        online: bool,
    },
    MessagesRead {
        room_id: RoomId,
        user_id: UserId,
    },
    Pong,
}

/// Inbound chat events, including the transport-level ones the gateway never
/// sends itself (`Connected`, `Disconnected`).
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Connected,
    Authenticated {
        user_id: UserId,
    },
    Disconnected {
        code: u16,
        reason: String,
    },
    Error {
        message: String,
    },
    Subscribed {
        room_id: RoomId,
    },
    Unsubscribed {
        room_id: RoomId,
    },
    NewMessage {
        room_id: RoomId,
        sender_id: UserId,
        body: String,
        timestamp: DateTime<Utc>,
    },
    MessageSent {
        room_id: RoomId,
        message_id: i64,
    },
    UserTyping {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },
    PresenceChanged {
        user_id: UserId,
        online: bool,
    },
    MessagesRead {
        room_id: RoomId,
        user_id: UserId,
    },
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerFrame {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Map a gateway frame to the event it represents. Heartbeat replies carry
    /// no event.
    pub fn into_event(self) -> Option<ChatEvent> {
        let event = match self {
            ServerFrame::Authenticated { user_id } => ChatEvent::Authenticated { user_id },
            ServerFrame::Error { message } => ChatEvent::Error { message },
            ServerFrame::Subscribed { room_id } => ChatEvent::Subscribed { room_id },
            ServerFrame::Unsubscribed { room_id } => ChatEvent::Unsubscribed { room_id },
            ServerFrame::NewMessage {
                room_id,
                sender_id,
                body,
                timestamp,
            } => ChatEvent::NewMessage {
                room_id,
                sender_id,
                body,
                timestamp,
            },
            ServerFrame::MessageSent {
                room_id,
                message_id,
            } => ChatEvent::MessageSent {
                room_id,
                message_id,
            },
            ServerFrame::Typing {
                room_id,
                user_id,
                is_typing,
            } => ChatEvent::UserTyping {
                room_id,
                user_id,
                is_typing,
            },
            ServerFrame::Presence { user_id, online } => {
                ChatEvent::PresenceChanged { user_id, online }
            }
            ServerFrame::MessagesRead { room_id, user_id } => {
                ChatEvent::MessagesRead { room_id, user_id }
            }
            ServerFrame::Pong => return None,
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_carry_type_tag() {
        let json = ClientFrame::Typing {
            room_id: RoomId(5),
            is_typing: true,
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["room_id"], 5);
        assert_eq!(value["is_typing"], true);

        let ping = ClientFrame::Ping.to_json().unwrap();
        assert_eq!(ping, r#"{"type":"ping"}"#);
    }

    #[test]
    fn new_message_frame_becomes_event() {
        let text = r#"{"type":"new_message","room_id":5,"sender_id":9,"body":"hi","timestamp":"2024-03-01T10:00:00Z"}"#;
        let event = ServerFrame::from_json(text).unwrap().into_event().unwrap();
        match event {
            ChatEvent::NewMessage {
                room_id,
                sender_id,
                body,
                timestamp,
            } => {
                assert_eq!(room_id, RoomId(5));
                assert_eq!(sender_id, UserId(9));
                assert_eq!(body, "hi");
                assert_eq!(timestamp.to_rfc3339(), "2024-03-01T10:00:00+00:00");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn pong_has_no_event() {
        let frame = ServerFrame::from_json(r#"{"type":"pong"}"#).unwrap();
        assert!(frame.into_event().is_none());
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(ServerFrame::from_json(r#"{"type":"reaction","room_id":1}"#).is_err());
    }
}
