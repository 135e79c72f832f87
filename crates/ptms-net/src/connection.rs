//! Chat connection state tracking.
//!
//! Holds the `Disconnected -> Connecting -> Connected -> Authenticated`
//! lifecycle, the rooms confirmed by the gateway, and the rooms the owner has
//! asked for so they can be replayed after a reconnect.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use ptms_shared::protocol::ChatEvent;
use ptms_shared::types::{ConnectionState, RoomId, UserId};

#[derive(Debug, Clone)]
pub struct ChatConnection {
    state: ConnectionState,
    user_id: Option<UserId>,
    subscribed: BTreeSet<RoomId>,
    desired: BTreeSet<RoomId>,
}

impl ChatConnection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            user_id: None,
            subscribed: BTreeSet::new(),
            desired: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// User id confirmed by the gateway for the current link.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Rooms the gateway confirmed on the current link.
    pub fn subscribed_rooms(&self) -> &BTreeSet<RoomId> {
        &self.subscribed
    }

    /// Rooms the owner wants, kept across reconnects.
    pub fn desired_rooms(&self) -> &BTreeSet<RoomId> {
        &self.desired
    }

    pub fn request_subscribe(&mut self, room_id: RoomId) {
        self.desired.insert(room_id);
    }

    pub fn request_unsubscribe(&mut self, room_id: RoomId) {
        self.desired.remove(&room_id);
    }

    /// Move to `Connecting`. Returns the new state if it changed.
    pub fn begin_connect(&mut self) -> Option<ConnectionState> {
        self.transition(ConnectionState::Connecting)
    }

    /// Fold an inbound event into the state. Returns the new state if the
    /// lifecycle moved.
    pub fn apply(&mut self, event: &ChatEvent) -> Option<ConnectionState> {
        match event {
            ChatEvent::Connected => self.transition(ConnectionState::Connected),
            ChatEvent::Authenticated { user_id } => {
                let changed = self.transition(ConnectionState::Authenticated);
                if self.is_authenticated() {
                    self.user_id = Some(*user_id);
                }
                changed
            }
            ChatEvent::Disconnected { .. } => self.transition(ConnectionState::Disconnected),
            ChatEvent::Subscribed { room_id } => {
                if self.is_authenticated() {
                    self.subscribed.insert(*room_id);
                } else {
                    warn!(room = %room_id, "Subscription confirmed while not authenticated");
                }
                None
            }
            ChatEvent::Unsubscribed { room_id } => {
                self.subscribed.remove(room_id);
                None
            }
            ChatEvent::Error { .. }
            | ChatEvent::NewMessage { .. }
            | ChatEvent::MessageSent { .. }
            | ChatEvent::UserTyping { .. }
            | ChatEvent::PresenceChanged { .. }
            | ChatEvent::MessagesRead { .. } => None,
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Option<ConnectionState> {
        if self.state == next {
            return None;
        }
        if !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "Ignoring illegal chat state transition");
            return None;
        }

        debug!(from = ?self.state, to = ?next, "Chat connection state changed");
        self.state = next;

        if next == ConnectionState::Disconnected {
            self.subscribed.clear();
            self.user_id = None;
        }
        Some(next)
    }
}

impl Default for ChatConnection {
    fn default() -> Self {
        Self::new()
    }
}
