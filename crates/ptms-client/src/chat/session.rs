//! Chat screen state: optimistic messages, typing and name resolution.
//!
//! [`ChatSession`] sits between the chat task's notifications and the UI. It
//! keeps the in-memory message list per room (never persisted), turns
//! notifications into [`ChatUiEvent`]s and issues commands to the chat task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ptms_net::{ChatCommand, ChatNotification};
use ptms_shared::protocol::ChatEvent;
use ptms_shared::types::{ConnectionState, DeliveryState, RoomId, UserId};
use ptms_shared::{PtmsError, PtmsResult};

use crate::chat::names::NameCache;
use crate::chat::typing::TypingDebouncer;
use crate::events::*;

/// A chat message held for the lifetime of the chat screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub local_id: Uuid,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub delivery: DeliveryState,
    /// Server id, known once the gateway confirmed the send.
    pub message_id: Option<i64>,
    // the gateway's broadcast of our own message was already folded in
    echoed: bool,
}

type TypingRooms = HashMap<RoomId, TypingDebouncer>;

pub struct ChatSession {
    self_id: UserId,
    names: NameCache,
    commands: mpsc::Sender<ChatCommand>,
    connection: ConnectionState,
    typing_idle: Duration,
    // shared with the idle ticker, never locked across an await
    typing: Arc<Mutex<TypingRooms>>,
    rooms: HashMap<RoomId, Vec<ChatMessage>>,
}

impl ChatSession {
    /// Must be called inside a tokio runtime: it spawns the ticker that
    /// closes idle typing bursts. The ticker stops once the session is
    /// dropped.
    pub fn new(
        self_id: UserId,
        names: NameCache,
        commands: mpsc::Sender<ChatCommand>,
        typing_idle: Duration,
    ) -> Self {
        let typing = Arc::new(Mutex::new(TypingRooms::new()));
        spawn_typing_ticker(Arc::downgrade(&typing), commands.clone(), typing_idle);
        Self {
            self_id,
            names,
            commands,
            connection: ConnectionState::Disconnected,
            typing_idle,
            typing,
            rooms: HashMap::new(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn names(&self) -> &NameCache {
        &self.names
    }

    /// Messages of `room_id` in arrival order.
    pub fn messages(&self, room_id: RoomId) -> &[ChatMessage] {
        self.rooms.get(&room_id).map(Vec::as_slice).unwrap_or(&[])
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    pub async fn join_room(&mut self, room_id: RoomId) -> PtmsResult<()> {
        self.dispatch(ChatCommand::Subscribe(room_id)).await
    }

    pub async fn leave_room(&mut self, room_id: RoomId) -> PtmsResult<()> {
        let stopped = self
            .typing_rooms()
            .remove(&room_id)
            .and_then(|mut debouncer| debouncer.on_send());
        if stopped == Some(false) {
            let _ = self
                .dispatch(ChatCommand::SetTyping {
                    room_id,
                    is_typing: false,
                })
                .await;
        }
        self.dispatch(ChatCommand::Unsubscribe(room_id)).await
    }

    pub async fn mark_read(&mut self, room_id: RoomId) -> PtmsResult<()> {
        self.dispatch(ChatCommand::MarkRead(room_id)).await
    }

    /// Append a local echo and hand the message to the chat task.
    ///
    /// The returned message is `Pending`, or already `Failed` when the chat
    /// task is gone.
    pub async fn send_message(&mut self, room_id: RoomId, body: &str) -> PtmsResult<ChatMessage> {
        let body = body.trim();
        if body.is_empty() {
            return Err(PtmsError::Validation("message is empty".into()));
        }

        let stopped = self
            .typing_rooms()
            .get_mut(&room_id)
            .and_then(TypingDebouncer::on_send);
        if stopped == Some(false) {
            let _ = self
                .dispatch(ChatCommand::SetTyping {
                    room_id,
                    is_typing: false,
                })
                .await;
        }

        let message = ChatMessage {
            local_id: Uuid::new_v4(),
            room_id,
            sender_id: self.self_id,
            body: body.to_string(),
            timestamp: Utc::now(),
            delivery: DeliveryState::Pending,
            message_id: None,
            echoed: false,
        };
        let local_id = message.local_id;
        self.rooms.entry(room_id).or_default().push(message);

        self.deliver(room_id, local_id).await
    }

    /// Send a `Failed` message again.
    pub async fn retry_message(&mut self, room_id: RoomId, local_id: Uuid) -> PtmsResult<ChatMessage> {
        let message = self
            .find_mut(room_id, local_id)
            .ok_or_else(|| PtmsError::Validation("unknown message".into()))?;
        if message.delivery != DeliveryState::Failed {
            return Err(PtmsError::Validation("only failed messages can be retried".into()));
        }
        message.delivery = DeliveryState::Pending;
        message.echoed = false;
        debug!(room = %room_id, %local_id, "Retrying message");

        self.deliver(room_id, local_id).await
    }

    /// Feed a keystroke in `room_id`.
    pub async fn on_input(&mut self, room_id: RoomId, now: Instant) {
        let idle = self.typing_idle;
        let started = self
            .typing_rooms()
            .entry(room_id)
            .or_insert_with(|| TypingDebouncer::new(idle))
            .on_input(now);
        if started == Some(true) {
            let _ = self
                .dispatch(ChatCommand::SetTyping {
                    room_id,
                    is_typing: true,
                })
                .await;
        }
    }

    /// Close typing bursts whose idle window elapsed at `now`. The session's
    /// ticker does this on its own; explicit calls only move it forward.
    pub async fn poll_typing(&mut self, now: Instant) {
        let stopped = expired_typing(&self.typing, now);

        for room_id in stopped {
            let _ = self
                .dispatch(ChatCommand::SetTyping {
                    room_id,
                    is_typing: false,
                })
                .await;
        }
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Fold one notification from the chat task into the session.
    pub fn handle(&mut self, notification: ChatNotification) -> Vec<ChatUiEvent> {
        match notification {
            ChatNotification::StateChanged(state) => {
                self.connection = state;
                if state == ConnectionState::Disconnected {
                    // reported with its close code by the matching event
                    return Vec::new();
                }
                vec![connection_event(state, None, None, false)]
            }
            ChatNotification::Event(event) => self.handle_event(event),
            ChatNotification::SendFailed {
                room_id,
                body,
                reason,
            } => {
                warn!(room = %room_id, reason = %reason, "Message not delivered");
                self.fail_pending(room_id, Some(&body), &reason)
                    .into_iter()
                    .collect()
            }
            ChatNotification::ReconnectFailed { attempts } => {
                self.connection = ConnectionState::Disconnected;
                vec![connection_event(
                    ConnectionState::Disconnected,
                    None,
                    Some(format!("gave up after {attempts} reconnect attempts")),
                    true,
                )]
            }
        }
    }

    fn handle_event(&mut self, event: ChatEvent) -> Vec<ChatUiEvent> {
        match event {
            ChatEvent::Connected | ChatEvent::Authenticated { .. } => Vec::new(),
            ChatEvent::Disconnected { code, reason } => {
                info!(code, reason = %reason, "Chat link lost");
                let mut events = vec![connection_event(
                    ConnectionState::Disconnected,
                    Some(code),
                    Some(reason.clone()),
                    false,
                )];
                // unconfirmed sends may not have reached the gateway
                let rooms: Vec<RoomId> = self.rooms.keys().copied().collect();
                for room_id in rooms {
                    while let Some(ev) = self.fail_pending(room_id, None, &reason) {
                        events.push(ev);
                    }
                }
                events
            }
            ChatEvent::Error { message } => {
                let mut events = Vec::new();
                if self.connection == ConnectionState::Disconnected {
                    events.push(connection_event(
                        ConnectionState::Disconnected,
                        None,
                        Some(message.clone()),
                        false,
                    ));
                }
                events.push(ChatUiEvent::Error(ErrorPayload { message }));
                events
            }
            ChatEvent::Subscribed { room_id } => {
                vec![ChatUiEvent::RoomMembership(RoomMembershipPayload {
                    room_id,
                    subscribed: true,
                })]
            }
            ChatEvent::Unsubscribed { room_id } => {
                vec![ChatUiEvent::RoomMembership(RoomMembershipPayload {
                    room_id,
                    subscribed: false,
                })]
            }
            ChatEvent::NewMessage {
                room_id,
                sender_id,
                body,
                timestamp,
            } => self.receive_message(room_id, sender_id, body, timestamp),
            ChatEvent::MessageSent {
                room_id,
                message_id,
            } => self.confirm_sent(room_id, message_id).into_iter().collect(),
            ChatEvent::UserTyping {
                room_id,
                user_id,
                is_typing,
            } => {
                if user_id == self.self_id {
                    return Vec::new();
                }
                vec![ChatUiEvent::Typing(TypingPayload {
                    room_id,
                    user_id,
                    user_name: self.names.display_name(user_id),
                    is_typing,
                })]
            }
            ChatEvent::PresenceChanged { user_id, online } => {
                vec![ChatUiEvent::Presence(PresencePayload {
                    user_id,
                    user_name: self.names.display_name(user_id),
                    online,
                })]
            }
            ChatEvent::MessagesRead { room_id, user_id } => {
                if user_id == self.self_id {
                    return Vec::new();
                }
                vec![ChatUiEvent::ReadReceipt(ReadReceiptPayload {
                    room_id,
                    user_id,
                    user_name: self.names.display_name(user_id),
                })]
            }
        }
    }

    fn receive_message(
        &mut self,
        room_id: RoomId,
        sender_id: UserId,
        body: String,
        timestamp: DateTime<Utc>,
    ) -> Vec<ChatUiEvent> {
        let messages = self.rooms.entry(room_id).or_default();

        if sender_id == self.self_id {
            let own_echo = messages.iter_mut().find(|m| {
                m.sender_id == sender_id
                    && !m.echoed
                    && m.body == body
                    && m.delivery != DeliveryState::Failed
            });
            if let Some(local) = own_echo {
                local.echoed = true;
                return Vec::new();
            }
        }

        let message = ChatMessage {
            local_id: Uuid::new_v4(),
            room_id,
            sender_id,
            body,
            timestamp,
            delivery: DeliveryState::Sent,
            message_id: None,
            echoed: true,
        };
        let payload = self.message_payload(&message);
        self.rooms.entry(room_id).or_default().push(message);
        vec![ChatUiEvent::NewMessage(payload)]
    }

    // Oldest pending message of the room is the one the gateway confirmed.
    fn confirm_sent(&mut self, room_id: RoomId, message_id: i64) -> Option<ChatUiEvent> {
        let Some(message) = self
            .rooms
            .get_mut(&room_id)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.delivery == DeliveryState::Pending))
        else {
            debug!(room = %room_id, message_id, "Confirmation without pending message");
            return None;
        };

        message.delivery = DeliveryState::Sent;
        message.message_id = Some(message_id);
        Some(ChatUiEvent::DeliveryChanged(DeliveryPayload {
            local_id: message.local_id,
            room_id,
            delivery: DeliveryState::Sent,
            message_id: Some(message_id),
            error: None,
        }))
    }

    // Mark the oldest pending message (with `body` when given) as failed.
    fn fail_pending(&mut self, room_id: RoomId, body: Option<&str>, reason: &str) -> Option<ChatUiEvent> {
        let messages = self.rooms.get_mut(&room_id)?;
        let message = messages
            .iter_mut()
            .filter(|m| m.delivery == DeliveryState::Pending)
            .find(|m| body.map_or(true, |b| m.body == b))?;

        message.delivery = DeliveryState::Failed;
        Some(ChatUiEvent::DeliveryChanged(DeliveryPayload {
            local_id: message.local_id,
            room_id,
            delivery: DeliveryState::Failed,
            message_id: None,
            error: Some(reason.to_string()),
        }))
    }

    async fn deliver(&mut self, room_id: RoomId, local_id: Uuid) -> PtmsResult<ChatMessage> {
        let body = self
            .find_mut(room_id, local_id)
            .map(|m| m.body.clone())
            .ok_or_else(|| PtmsError::Validation("unknown message".into()))?;

        let sent = self
            .dispatch(ChatCommand::SendMessage { room_id, body })
            .await;

        let message = self
            .find_mut(room_id, local_id)
            .ok_or_else(|| PtmsError::Validation("unknown message".into()))?;
        if let Err(e) = sent {
            warn!(room = %room_id, error = %e, "Message could not be queued");
            message.delivery = DeliveryState::Failed;
        }
        Ok(message.clone())
    }

    fn find_mut(&mut self, room_id: RoomId, local_id: Uuid) -> Option<&mut ChatMessage> {
        self.rooms
            .get_mut(&room_id)?
            .iter_mut()
            .find(|m| m.local_id == local_id)
    }

    pub fn message_payload(&self, message: &ChatMessage) -> MessagePayload {
        MessagePayload {
            local_id: message.local_id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            sender_name: self.names.display_name(message.sender_id),
            body: message.body.clone(),
            timestamp: message.timestamp,
            delivery: message.delivery,
            is_own: message.sender_id == self.self_id,
        }
    }

    fn typing_rooms(&self) -> MutexGuard<'_, TypingRooms> {
        self.typing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch(&self, command: ChatCommand) -> PtmsResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PtmsError::Network("chat connection closed".into()))
    }
}

/// Rooms whose typing burst ended at `now`; their debouncers are reset.
fn expired_typing(typing: &Mutex<TypingRooms>, now: Instant) -> Vec<RoomId> {
    typing
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter_mut()
        .filter_map(|(room_id, d)| (d.poll(now) == Some(false)).then_some(*room_id))
        .collect()
}

fn spawn_typing_ticker(
    typing: Weak<Mutex<TypingRooms>>,
    commands: mpsc::Sender<ChatCommand>,
    idle: Duration,
) {
    let period = (idle / 4).max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(typing) = typing.upgrade() else {
                debug!("Chat session dropped, typing ticker stopped");
                return;
            };
            let stopped = expired_typing(&typing, Instant::now());
            drop(typing);

            for room_id in stopped {
                debug!(room = %room_id, "Typing idle window elapsed");
                let command = ChatCommand::SetTyping {
                    room_id,
                    is_typing: false,
                };
                if commands.send(command).await.is_err() {
                    return;
                }
            }
        }
    });
}

fn connection_event(
    state: ConnectionState,
    code: Option<u16>,
    reason: Option<String>,
    gave_up: bool,
) -> ChatUiEvent {
    ChatUiEvent::ConnectionChanged(ConnectionPayload {
        state,
        code,
        reason,
        gave_up,
    })
}
