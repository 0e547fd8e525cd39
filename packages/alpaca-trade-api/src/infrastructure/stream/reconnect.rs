//! Reconnection Policy
//!
//! Linear backoff with optional jitter: attempt `n` waits `wait * n`. The
//! policy is bounded by `max_retries` and reset after every successful
//! connection.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::ReconnectSettings;

/// Reconnect attempt counter and delay schedule.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    settings: ReconnectSettings,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(settings: ReconnectSettings) -> Self {
        Self {
            settings,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;
        let base = self.settings.wait.saturating_mul(self.attempt_count);
        Some(self.apply_jitter(base))
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.attempt_count < self.settings.max_retries
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.settings.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.settings.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted = adjusted_millis as u64;
        Duration::from_millis(adjusted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_retries: u32, wait_ms: u64, jitter_factor: f64) -> ReconnectSettings {
        ReconnectSettings {
            max_retries,
            wait: Duration::from_millis(wait_ms),
            jitter_factor,
        }
    }

    #[test]
    fn delays_grow_linearly() {
        let mut policy = ReconnectPolicy::new(settings(3, 100, 0.0));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempt_count(), 3);
    }

    #[test]
    fn reset_restores_budget() {
        let mut policy = ReconnectPolicy::new(settings(1, 100, 0.0));
        assert!(policy.next_delay().is_some());
        assert!(!policy.should_retry());
        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn zero_retries_never_retries() {
        let mut policy = ReconnectPolicy::new(settings(0, 100, 0.0));
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn jitter_stays_within_range() {
        let mut policy = ReconnectPolicy::new(settings(100, 1000, 0.1));
        for attempt in 1..=100u64 {
            let delay = policy.next_delay().unwrap().as_millis();
            let base = u128::from(attempt * 1000);
            assert!(delay >= base * 9 / 10 - 1 && delay <= base * 11 / 10 + 1);
        }
    }
}
