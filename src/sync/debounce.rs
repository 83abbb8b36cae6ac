//! Trailing-edge debouncer with an explicit clock.

use std::time::Duration;
use tokio::time::Instant;

/// Holds the latest value until no newer one has arrived for `delay`.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self { Self { delay, pending: None } }

    /// Replaces any pending value and returns the new deadline.
    pub fn push(&mut self, value: T, now: Instant) -> Instant {
        let deadline = now + self.delay;
        self.pending = Some((value, deadline));
        deadline
    }

    /// Takes the pending value once its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> { self.pending.as_ref().map(|(_, d)| *d) }
    pub fn is_pending(&self) -> bool { self.pending.is_some() }
}
