/// Fixed-delay reconnect policy
use std::time::Duration;
use tracing::debug;

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Reconnect forever, always waiting the same delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay applied after every failed or dropped connection
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Start a fresh attempt counter for this policy
    pub fn schedule(&self) -> ReconnectSchedule {
        ReconnectSchedule {
            policy: *self,
            attempts: 0,
        }
    }
}

/// Tracks reconnect attempts for one connection lifetime.
///
/// The counter only grows for logging; the delay itself never changes.
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectSchedule {
    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        debug!(
            "Reconnect attempt {} scheduled in {:?}",
            self.attempts, self.policy.delay
        );
        self.policy.delay
    }

    /// Number of reconnects scheduled since the last successful connection
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Forget previous failures after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_five_seconds() {
        assert_eq!(ReconnectPolicy::default().delay, Duration::from_millis(5000));
    }

    #[test]
    fn test_fixed_delay_never_grows() {
        let mut schedule = ReconnectPolicy::fixed(Duration::from_millis(250)).schedule();

        for _ in 0..1000 {
            assert_eq!(schedule.next_delay(), Duration::from_millis(250));
        }
        assert_eq!(schedule.attempts(), 1000);
    }

    #[test]
    fn test_reset_clears_attempts() {
        let mut schedule = ReconnectPolicy::fixed(Duration::from_millis(10)).schedule();

        schedule.next_delay();
        schedule.next_delay();
        assert_eq!(schedule.attempts(), 2);

        schedule.reset();
        assert_eq!(schedule.attempts(), 0);
        assert_eq!(schedule.next_delay(), Duration::from_millis(10));
    }
}
