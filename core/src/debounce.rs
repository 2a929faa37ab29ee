//! Debounce state machine
//!
//! Coalesces a burst of rapidly changing values into one trailing value once
//! the input has been quiet for `wait`. The debouncer never reads the time on
//! its own: callers pass `now` in, so the same code runs against tokio timers
//! or a hand-driven test clock.

use std::time::{Duration, Instant};

/// Default quiet period for search input.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Trailing-edge debouncer.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    wait: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            pending: None,
            deadline: None,
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Record a new value and re-arm the deadline to `now + wait`.
    ///
    /// Any previously armed deadline is dropped, so only the last value of a
    /// burst ever fires.
    pub fn call(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.deadline = Some(now + self.wait);
    }

    /// Fire if the deadline has passed, yielding the last value.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Instant at which the pending value fires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm without firing, returning the discarded value.
    pub fn cancel(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
