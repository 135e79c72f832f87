use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use ptms_shared::types::{ConnectionState, DeliveryState, RoomId, UserId};

pub const EVENT_CONNECTION_CHANGED: &str = "chat-connection-changed";
pub const EVENT_NEW_MESSAGE: &str = "chat-new-message";
pub const EVENT_DELIVERY_CHANGED: &str = "chat-delivery-changed";
pub const EVENT_TYPING: &str = "chat-typing";
pub const EVENT_PRESENCE: &str = "chat-presence";
pub const EVENT_READ_RECEIPT: &str = "chat-read-receipt";
pub const EVENT_ROOM_MEMBERSHIP: &str = "chat-room-membership";
pub const EVENT_CHAT_ERROR: &str = "chat-error";

/// What the chat screen has to react to, already resolved against the name
/// cache and the local message list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChatUiEvent {
    ConnectionChanged(ConnectionPayload),
    NewMessage(MessagePayload),
    DeliveryChanged(DeliveryPayload),
    Typing(TypingPayload),
    Presence(PresencePayload),
    ReadReceipt(ReadReceiptPayload),
    RoomMembership(RoomMembershipPayload),
    Error(ErrorPayload),
}

impl ChatUiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatUiEvent::ConnectionChanged(_) => EVENT_CONNECTION_CHANGED,
            ChatUiEvent::NewMessage(_) => EVENT_NEW_MESSAGE,
            ChatUiEvent::DeliveryChanged(_) => EVENT_DELIVERY_CHANGED,
            ChatUiEvent::Typing(_) => EVENT_TYPING,
            ChatUiEvent::Presence(_) => EVENT_PRESENCE,
            ChatUiEvent::ReadReceipt(_) => EVENT_READ_RECEIPT,
            ChatUiEvent::RoomMembership(_) => EVENT_ROOM_MEMBERSHIP,
            ChatUiEvent::Error(_) => EVENT_CHAT_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPayload {
    pub state: ConnectionState,
    /// Close code when the link dropped.
    pub code: Option<u16>,
    pub reason: Option<String>,
    /// Automatic reconnection has given up.
    pub gave_up: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub local_id: Uuid,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub delivery: DeliveryState,
    pub is_own: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    pub local_id: Uuid,
    pub room_id: RoomId,
    pub delivery: DeliveryState,
    pub message_id: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub user_name: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: UserId,
    pub user_name: String,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptPayload {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMembershipPayload {
    pub room_id: RoomId,
    pub subscribed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
}
