//! Periodic tick sources
//!
//! Polling never owns a raw timer. It asks a [`Scheduler`] for a tick stream
//! tied to a [`CancellationToken`]; cancelling the token ends the stream.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub type Tick = Instant;

pub trait Scheduler: Send + Sync {
    /// Emits a tick every `period` until `token` is cancelled. Ticks are never
    /// queued behind a slow consumer: a tick that cannot be delivered is dropped.
    fn schedule(&self, period: Duration, token: CancellationToken) -> mpsc::Receiver<Tick>;
}

/// Real timer backed by `tokio::time::interval`.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntervalScheduler;

impl Scheduler for IntervalScheduler {
    fn schedule(&self, period: Duration, token: CancellationToken) -> mpsc::Receiver<Tick> {
        let (tx, rx) = mpsc::channel(1);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    at = ticker.tick() => match tx.try_send(at) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => break,
                    },
                }
            }
            tracing::trace!(?period, "tick stream stopped");
        });
        rx
    }
}

struct Subscription {
    period: Duration,
    token: CancellationToken,
    tx: mpsc::Sender<Tick>,
}

/// Ticks only when told to, for driving pollers step by step.
#[derive(Default)]
pub struct ManualScheduler {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler").field("active", &self.active()).finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self { Self::default() }

    fn live(&self) -> MutexGuard<'_, Vec<Subscription>> {
        let mut subs = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|s| !s.token.is_cancelled() && !s.tx.is_closed());
        subs
    }

    /// Delivers one tick to every live subscription and returns how many took it.
    pub fn fire(&self) -> usize {
        let now = Instant::now();
        self.live().iter().filter(|s| s.tx.try_send(now).is_ok()).count()
    }

    pub fn active(&self) -> usize { self.live().len() }

    pub fn periods(&self) -> Vec<Duration> { self.live().iter().map(|s| s.period).collect() }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, period: Duration, token: CancellationToken) -> mpsc::Receiver<Tick> {
        let (tx, rx) = mpsc::channel(1);
        self.live().push(Subscription { period, token, tx });
        rx
    }
}
