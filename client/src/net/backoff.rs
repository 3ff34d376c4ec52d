//! Reconnect schedule: exponential backoff with a hard attempt cap.

#[cfg(test)]
#[path = "backoff_test.rs"]
mod backoff_test;

use std::time::Duration;

/// Exponential reconnect policy without jitter.
///
/// Attempt `n` (1-based) waits `base_delay * 2^(n-1)`. Attempts past
/// `max_attempts` get no delay at all: the connection is given up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Highest attempt number that is still scheduled.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self { base_delay, max_attempts }
    }

    /// Delay to wait before reconnect attempt `attempt`, or `None` once the
    /// attempt cap is exceeded.
    ///
    /// # Examples
    ///
    /// ```
    /// use client::net::backoff::ReconnectPolicy;
    /// use std::time::Duration;
    /// let policy = ReconnectPolicy::default();
    /// assert_eq!(policy.delay_for(3), Some(Duration::from_millis(4000)));
    /// assert_eq!(policy.delay_for(6), None);
    /// ```
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2_u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.checked_mul(factor).unwrap_or(Duration::MAX))
    }

    /// Every delay this policy will schedule, in attempt order.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).filter_map(|attempt| self.delay_for(attempt))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_DELAY, Self::DEFAULT_MAX_ATTEMPTS)
    }
}
