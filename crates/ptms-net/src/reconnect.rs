//! Capped exponential backoff for chat reconnection.

use std::time::Duration;

use ptms_shared::constants::{
    DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INITIAL_MS, DEFAULT_RECONNECT_MAX_MS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed connections tolerated before giving up.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            max_delay: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based), or `None`
    /// once the budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_capped() {
        let policy = ReconnectPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        let delays: Vec<u64> = (1..=6)
            .map(|n| policy.delay_for(n).unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn budget_is_finite() {
        let policy = ReconnectPolicy::default();
        assert!(policy.delay_for(0).is_none());
        assert!(policy.delay_for(policy.max_attempts).is_some());
        assert!(policy.delay_for(policy.max_attempts + 1).is_none());
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = ReconnectPolicy {
            max_attempts: u32::MAX,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(200), Some(policy.max_delay));
    }
}
