//! # Commitment Polling
//!
//! Bounded exponential backoff for P-Chain status polls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Doubling stops after this many attempts.
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Poll schedule for step 3.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay before the second poll.
    pub initial_interval_ms: u64,
    /// Ceiling for any single delay.
    pub max_interval_ms: u64,
    /// Give up after this many polls. `None` polls forever.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            max_interval_ms: 10_000,
            max_attempts: Some(120),
        }
    }
}

impl PollPolicy {
    /// Fast schedule for tests.
    pub fn for_testing() -> Self {
        Self {
            initial_interval_ms: 1,
            max_interval_ms: 4,
            max_attempts: Some(20),
        }
    }

    /// Delay after poll number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = std::cmp::min(
            self.initial_interval_ms
                .saturating_mul(1u64 << attempt.min(MAX_BACKOFF_SHIFT)),
            self.max_interval_ms,
        );
        Duration::from_millis(ms)
    }

    /// True when another poll is allowed after `attempts` polls.
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(100), Duration::from_millis(10_000));
    }

    #[test]
    fn test_attempt_bound() {
        let policy = PollPolicy {
            max_attempts: Some(3),
            ..PollPolicy::default()
        };
        assert!(policy.allows(2));
        assert!(!policy.allows(3));

        let unbounded = PollPolicy {
            max_attempts: None,
            ..PollPolicy::default()
        };
        assert!(unbounded.allows(u32::MAX));
    }
}
