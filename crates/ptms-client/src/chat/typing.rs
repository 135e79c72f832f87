//! Per-room typing indicator debounce.
//!
//! Pure state machine; callers pass the current `Instant` so the timing can be
//! driven from a tokio interval or from tests.

use std::time::{Duration, Instant};

/// Emits `Some(true)` once per typing burst and `Some(false)` when the burst
/// ends, either after `idle` without input or when the message is sent.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    idle: Duration,
    typing: bool,
    last_input: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            typing: false,
            last_input: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// A keystroke happened.
    pub fn on_input(&mut self, now: Instant) -> Option<bool> {
        self.last_input = Some(now);
        if self.typing {
            return None;
        }
        self.typing = true;
        Some(true)
    }

    /// Check the idle window.
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        let last = self.last_input?;
        if self.typing && now.saturating_duration_since(last) >= self.idle {
            return self.stop();
        }
        None
    }

    /// The message was sent; typing ends immediately.
    pub fn on_send(&mut self) -> Option<bool> {
        self.stop()
    }

    fn stop(&mut self) -> Option<bool> {
        self.last_input = None;
        if !self.typing {
            return None;
        }
        self.typing = false;
        Some(false)
    }
}
