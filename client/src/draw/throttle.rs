//! Trailing-edge throttle driven by explicit instants.
//!
//! The first request in an idle window arms a deadline one window ahead.
//! Requests before the deadline coalesce into it. When the deadline passes,
//! [`Throttle::fire`] reports exactly one flush and the throttle goes idle.

#[cfg(test)]
#[path = "throttle_test.rs"]
mod throttle_test;

use std::time::Duration;

use tokio::time::Instant;

/// Default flush window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(150);

#[derive(Clone, Copy, Debug)]
pub struct Throttle {
    window: Duration,
    deadline: Option<Instant>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl Throttle {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Pending flush deadline, if armed.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Ask for a flush. Returns true if this request armed a new deadline.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.window);
        true
    }

    /// Returns true, and disarms, once the deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending flush.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
