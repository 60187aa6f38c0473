//! One-shot, restart-on-trigger deadline.
//!
//! Every [`Debouncer::trigger`] pushes the deadline out to `now + delay`, so a
//! burst of triggers fires once, `delay` after the last of them. The debouncer
//! only tracks the deadline; whoever owns it decides how to wait (see
//! `service`, which sleeps on [`Debouncer::deadline`]).

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the timer. A delay past the clock's range never fires.
    pub fn trigger(&mut self) {
        self.deadline = Instant::now().checked_add(self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the deadline if it has passed. Returns `true` at most once per arming.
    pub fn fire_if_due(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
