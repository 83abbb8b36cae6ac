//! Order list synchronizer
//!
//! Keeps an [`OrderCollection`] loosely in sync with the gateway while the list
//! view is focused:
//!
//! - at most one list request is in flight; a poll tick that arrives meanwhile is
//!   skipped, while user loads queue behind it and run in the order they were issued
//! - results that resolve after the view lost focus are discarded
//! - poll failures are logged and back off exponentially instead of surfacing
//! - search input is debounced before a filter pass runs
//!
//! All mutation of the collection happens under one async lock, so a poll-driven
//! refresh and a user-driven filter change never interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::domain::aggregates::Order;
use crate::gateway::{GatewayError, ListQuery, OrderGateway, SortOrder};
use super::collection::{OrderCollection, OrderFilter};
use super::debounce::Debouncer;
use super::scheduler::{Scheduler, Tick};

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub page_size: u32,
    pub poll_interval: Duration,
    pub search_debounce: Duration,
    /// Upper bound on poll ticks skipped after repeated failures.
    pub max_backoff_ticks: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { page_size: 20, poll_interval: Duration::from_secs(30), search_debounce: Duration::from_millis(300), max_backoff_ticks: 8 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page differed from the held one and replaced it.
    Replaced,
    /// The page matched the held one; nothing changed.
    Unchanged,
    /// Another fetch was already in flight.
    Skipped,
    /// The view lost focus while the request was outstanding.
    Discarded,
    /// The requested page is outside `[1, total_pages]`.
    OutOfRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Fetched(FetchOutcome),
    BackedOff,
    Failed,
}

#[derive(Debug, Default)]
struct PollBackoff {
    failures: u32,
    skip_remaining: u32,
}

impl PollBackoff {
    fn should_skip(&mut self) -> bool {
        if self.skip_remaining == 0 { return false; }
        self.skip_remaining -= 1;
        true
    }

    /// After the n-th consecutive failure, skip the next `2^(n-1) - 1` ticks.
    fn record_failure(&mut self, max_skip: u32) -> u32 {
        self.failures = self.failures.saturating_add(1);
        self.skip_remaining = (2u32.saturating_pow(self.failures - 1) - 1).min(max_skip);
        self.skip_remaining
    }

    fn record_success(&mut self) { *self = Self::default(); }
}

/// Page a fetch is aimed at, resolved only once the fetch gate is held so queued
/// loads see the page left behind by the ones before them.
#[derive(Clone, Copy, Debug)]
enum Target {
    Current,
    Page(u32),
    Navigate(u32),
    Next,
    Previous,
}

impl Target {
    /// `None` when navigation would leave `[1, total_pages]`.
    fn resolve(self, collection: &OrderCollection) -> Option<u32> {
        let current = collection.current_page();
        match self {
            Self::Current => Some(current),
            Self::Page(page) => Some(page),
            Self::Navigate(page) => collection.can_go_to(page).then_some(page),
            Self::Next => Self::Navigate(current.saturating_add(1)).resolve(collection),
            Self::Previous => Self::Navigate(current.saturating_sub(1)).resolve(collection),
        }
    }
}

struct Shared<G> {
    gateway: G,
    scheduler: Arc<dyn Scheduler>,
    config: SyncConfig,
    collection: AsyncMutex<OrderCollection>,
    search: AsyncMutex<Debouncer<String>>,
    /// Held for the whole of a list request. Tokio's mutex is fair, so waiters run in FIFO order.
    fetch_gate: AsyncMutex<()>,
    /// Bumped on every focus change; fetches started under an older value are dropped.
    epoch: AtomicU64,
    focus: Mutex<Option<(u64, CancellationToken)>>,
    backoff: Mutex<PollBackoff>,
    revision: watch::Sender<u64>,
}

impl<G> Shared<G> {
    fn focus_slot(&self) -> MutexGuard<'_, Option<(u64, CancellationToken)>> { self.focus.lock().unwrap_or_else(PoisonError::into_inner) }
    fn backoff(&self) -> MutexGuard<'_, PollBackoff> { self.backoff.lock().unwrap_or_else(PoisonError::into_inner) }
}

pub struct OrderSynchronizer<G> {
    shared: Arc<Shared<G>>,
}

impl<G> Clone for OrderSynchronizer<G> {
    fn clone(&self) -> Self { Self { shared: Arc::clone(&self.shared) } }
}

impl<G> std::fmt::Debug for OrderSynchronizer<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSynchronizer").field("config", &self.shared.config).finish_non_exhaustive()
    }
}

impl<G: OrderGateway + 'static> OrderSynchronizer<G> {
    pub fn new(gateway: G, scheduler: Arc<dyn Scheduler>, config: SyncConfig) -> Self {
        let (revision, _) = watch::channel(0);
        let search = AsyncMutex::new(Debouncer::new(config.search_debounce));
        Self {
            shared: Arc::new(Shared {
                gateway, scheduler, config, search, revision,
                collection: AsyncMutex::new(OrderCollection::new()),
                fetch_gate: AsyncMutex::new(()),
                epoch: AtomicU64::new(0),
                focus: Mutex::new(None),
                backoff: Mutex::new(PollBackoff::default()),
            }),
        }
    }

    pub fn gateway(&self) -> &G { &self.shared.gateway }
    pub fn config(&self) -> &SyncConfig { &self.shared.config }

    /// Yields the collection revision every time the visible view changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> { self.shared.revision.subscribe() }

    /// Runs `f` against the collection under the lock.
    pub async fn read<R>(&self, f: impl FnOnce(&OrderCollection) -> R) -> R {
        f(&*self.shared.collection.lock().await)
    }

    pub async fn visible(&self) -> Arc<Vec<Order>> { self.read(|c| Arc::clone(c.visible())).await }
    pub async fn current_page(&self) -> u32 { self.read(OrderCollection::current_page).await }
    pub fn is_fetching(&self) -> bool { self.shared.fetch_gate.try_lock().is_err() }
    pub fn is_focused(&self) -> bool { self.shared.focus_slot().is_some() }

    /// Fetches `page` and reconciles it into the collection, waiting for any
    /// outstanding list request to finish first.
    pub async fn fetch_page(&self, page: u32) -> Result<FetchOutcome, GatewayError> {
        let gate = self.shared.fetch_gate.lock().await;
        self.fetch_gated(gate, Target::Page(page)).await
    }

    async fn fetch_gated(&self, _gate: AsyncMutexGuard<'_, ()>, target: Target) -> Result<FetchOutcome, GatewayError> {
        let Some(mut page) = self.read(|c| target.resolve(c)).await else {
            debug!(?target, "page out of range, ignoring");
            return Ok(FetchOutcome::OutOfRange);
        };
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        let mut replaced = false;
        loop {
            let query = ListQuery { page, page_size: self.shared.config.page_size, sort: SortOrder::Descending };
            let result = self.shared.gateway.list_orders(query).await;
            if self.shared.epoch.load(Ordering::Acquire) != epoch {
                debug!(page, "view focus changed during fetch, discarding result");
                return Ok(FetchOutcome::Discarded);
            }
            let fetched = result?;

            let mut collection = self.shared.collection.lock().await;
            if collection.apply_page(page, fetched) {
                info!(page, orders = collection.raw().len(), total_pages = collection.total_pages(), "order page replaced");
                replaced = true;
            } else {
                debug!(page, "order page unchanged");
            }
            if let Some(last) = collection.clamped_page() {
                debug!(page, last, "order list shrank past the held page, fetching the last page");
                page = last;
                continue;
            }
            self.publish(&collection);
            return Ok(if replaced { FetchOutcome::Replaced } else { FetchOutcome::Unchanged });
        }
    }

    /// User-initiated load: queues behind any outstanding request and keeps
    /// failures as the visible error state.
    async fn load_target(&self, target: Target) -> Result<FetchOutcome, GatewayError> {
        let gate = self.shared.fetch_gate.lock().await;
        let result = self.fetch_gated(gate, target).await;
        let mut collection = self.shared.collection.lock().await;
        match &result {
            Ok(FetchOutcome::Replaced | FetchOutcome::Unchanged) => collection.clear_error(),
            Ok(_) => {}
            Err(e) => collection.record_error(e.to_string()),
        }
        result
    }

    pub async fn load(&self, page: u32) -> Result<FetchOutcome, GatewayError> { self.load_target(Target::Page(page)).await }

    /// Manual retry of the current page.
    pub async fn refresh(&self) -> Result<FetchOutcome, GatewayError> { self.load_target(Target::Current).await }

    pub async fn go_to_page(&self, page: u32) -> Result<FetchOutcome, GatewayError> { self.load_target(Target::Navigate(page)).await }
    pub async fn next_page(&self) -> Result<FetchOutcome, GatewayError> { self.load_target(Target::Next).await }
    pub async fn previous_page(&self) -> Result<FetchOutcome, GatewayError> { self.load_target(Target::Previous).await }

    /// Writes a locally updated order back into the held page, so views drop or
    /// regroup it without waiting for the next poll.
    pub async fn update_order(&self, order: &Order) -> bool {
        let mut collection = self.shared.collection.lock().await;
        let changed = collection.replace_order(order);
        if changed {
            debug!(order_id = %order.id, status = %order.status(), "order written back to the list");
            self.publish(&collection);
        }
        changed
    }

    pub async fn set_filter(&self, filter: OrderFilter) {
        let mut collection = self.shared.collection.lock().await;
        collection.set_filter(filter);
        self.publish(&collection);
    }

    pub async fn set_sort(&self, sort: SortOrder) {
        let mut collection = self.shared.collection.lock().await;
        collection.set_sort(sort);
        self.publish(&collection);
    }

    /// Records search input. The filter pass runs once input has been quiet for
    /// the debounce window, using the latest query.
    pub async fn search(&self, query: impl Into<String>) {
        let deadline = self.shared.search.lock().await.push(query.into(), Instant::now());
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            this.flush_search().await;
        });
    }

    /// Applies a pending search whose debounce window has elapsed.
    pub async fn flush_search(&self) -> bool {
        let Some(query) = self.shared.search.lock().await.take_due(Instant::now()) else { return false };
        let mut collection = self.shared.collection.lock().await;
        debug!(query = %query, "applying search");
        collection.set_query(query);
        self.publish(&collection);
        true
    }

    /// Starts polling the current page and refreshes it immediately. Polling stops
    /// when the returned guard is dropped or [`FocusGuard::release`]d.
    pub fn focus(&self) -> FocusGuard<G> {
        let token = CancellationToken::new();
        let session = {
            let mut slot = self.shared.focus_slot();
            if let Some((_, previous)) = slot.take() { previous.cancel(); }
            let session = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            *slot = Some((session, token.clone()));
            session
        };
        info!(session, interval = ?self.shared.config.poll_interval, "order list focused");

        let ticks = self.shared.scheduler.schedule(self.shared.config.poll_interval, token.clone());
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.refresh().await {
                warn!(error = %e, "refresh on focus failed");
            }
        });
        tokio::spawn(self.clone().poll_loop(ticks, token));
        FocusGuard { sync: self.clone(), session }
    }

    fn unfocus(&self, session: u64) {
        let mut slot = self.shared.focus_slot();
        if !matches!(&*slot, Some((current, _)) if *current == session) { return; }
        if let Some((_, token)) = slot.take() { token.cancel(); }
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        info!(session, "order list unfocused, polling stopped");
    }

    async fn poll_loop(self, mut ticks: mpsc::Receiver<Tick>, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                tick = ticks.recv() => {
                    if tick.is_none() { break; }
                    let this = self.clone();
                    tokio::spawn(async move { this.poll_tick().await });
                }
            }
        }
    }

    /// One polling step. Errors are logged and swallowed.
    pub async fn poll_tick(&self) -> PollOutcome {
        if self.shared.backoff().should_skip() {
            debug!("poll tick skipped by backoff");
            return PollOutcome::BackedOff;
        }
        let Ok(gate) = self.shared.fetch_gate.try_lock() else {
            debug!("list request already in flight, skipping tick");
            return PollOutcome::Fetched(FetchOutcome::Skipped);
        };
        match self.fetch_gated(gate, Target::Current).await {
            Ok(outcome) => {
                if matches!(outcome, FetchOutcome::Replaced | FetchOutcome::Unchanged) {
                    self.shared.backoff().record_success();
                }
                PollOutcome::Fetched(outcome)
            }
            Err(e) => {
                let skip = self.shared.backoff().record_failure(self.shared.config.max_backoff_ticks);
                warn!(error = %e, skip_ticks = skip, "order poll failed");
                PollOutcome::Failed
            }
        }
    }

    fn publish(&self, collection: &OrderCollection) {
        let revision = collection.revision();
        self.shared.revision.send_if_modified(|current| {
            if *current == revision { return false; }
            *current = revision;
            true
        });
    }
}

/// Keeps the list focused; dropping it stops polling and discards late results.
pub struct FocusGuard<G: OrderGateway + 'static> {
    sync: OrderSynchronizer<G>,
    session: u64,
}

impl<G: OrderGateway + 'static> FocusGuard<G> {
    pub fn session(&self) -> u64 { self.session }
    pub fn release(self) {}
}

impl<G: OrderGateway + 'static> Drop for FocusGuard<G> {
    fn drop(&mut self) { self.sync.unfocus(self.session); }
}

impl<G: OrderGateway + 'static> std::fmt::Debug for FocusGuard<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusGuard").field("session", &self.session).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderLine, OrderStatus, PaymentMethod};
    use crate::domain::value_objects::Money;
    use crate::gateway::InMemoryGateway;
    use crate::sync::scheduler::{IntervalScheduler, ManualScheduler};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn order(id: u32, customer: &str) -> Order {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + ChronoDuration::minutes(i64::from(id));
        let line = OrderLine { product_id: "P1".into(), product_name: Some("Arabica".into()), quantity_kg: Decimal::new(250, 3), unit_price: Money::from_minor(4500), subtotal: Money::from_minor(1125) };
        Order::placed(id.to_string(), "C1", customer, "B1", vec![line], Money::from_minor(1125), PaymentMethod::Cash, at)
    }

    fn gateway(count: u32) -> Arc<InMemoryGateway> {
        Arc::new(InMemoryGateway::with_orders((1..=count).map(|i| order(i, &format!("Customer {i}")))))
    }

    fn sync_with(gateway: Arc<InMemoryGateway>, scheduler: Arc<dyn Scheduler>) -> OrderSynchronizer<Arc<InMemoryGateway>> {
        OrderSynchronizer::new(gateway, scheduler, SyncConfig { page_size: 2, ..SyncConfig::default() })
    }

    async fn until(mut cond: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if cond() { return; }
            tokio::task::yield_now().await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn test_identical_refetch_keeps_collection() {
        let gw = gateway(3);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        assert_eq!(sync.fetch_page(1).await.unwrap(), FetchOutcome::Replaced);
        let held = sync.read(|c| Arc::clone(c.raw())).await;
        let rx = sync.subscribe();
        assert_eq!(sync.fetch_page(1).await.unwrap(), FetchOutcome::Unchanged);
        assert!(Arc::ptr_eq(&held, &sync.read(|c| Arc::clone(c.raw())).await));
        assert!(!rx.has_changed().unwrap());

        gw.set_status("3", OrderStatus::InProgress);
        assert_eq!(sync.fetch_page(1).await.unwrap(), FetchOutcome::Replaced);
        assert!(rx.has_changed().unwrap());
        assert_eq!(sync.visible().await[0].status(), OrderStatus::InProgress);
    }

    #[tokio::test]
    async fn test_navigation_outside_page_range_is_ignored() {
        let gw = gateway(5);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        sync.fetch_page(1).await.unwrap();
        assert_eq!(sync.read(OrderCollection::total_pages).await, 3);
        assert_eq!(sync.go_to_page(0).await.unwrap(), FetchOutcome::OutOfRange);
        assert_eq!(sync.go_to_page(4).await.unwrap(), FetchOutcome::OutOfRange);
        assert_eq!(sync.previous_page().await.unwrap(), FetchOutcome::OutOfRange);
        assert_eq!(sync.current_page().await, 1);
        assert_eq!(gw.list_calls(), 1);

        assert_eq!(sync.go_to_page(3).await.unwrap(), FetchOutcome::Replaced);
        assert_eq!(sync.current_page().await, 3);
        assert_eq!(sync.next_page().await.unwrap(), FetchOutcome::OutOfRange);
        assert_eq!(sync.visible().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tick_during_outstanding_fetch_is_skipped() {
        let gw = gateway(2);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        gw.hold_listings();
        let first = tokio::spawn({
            let sync = sync.clone();
            async move { sync.fetch_page(1).await }
        });
        until(|| gw.list_calls() == 1).await;
        assert_eq!(sync.poll_tick().await, PollOutcome::Fetched(FetchOutcome::Skipped));
        assert_eq!(gw.list_calls(), 1);
        gw.release_listings();
        assert_eq!(first.await.unwrap().unwrap(), FetchOutcome::Replaced);
        assert!(!sync.is_fetching());
    }

    #[tokio::test]
    async fn test_late_result_after_unfocus_is_discarded() {
        let gw = gateway(2);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        gw.hold_listings();
        let guard = sync.focus();
        until(|| gw.list_calls() == 1).await;
        drop(guard);
        assert!(!sync.is_focused());
        gw.release_listings();
        until(|| !sync.is_fetching()).await;
        assert!(!sync.read(OrderCollection::is_loaded).await);
        assert!(sync.visible().await.is_empty());
    }

    #[tokio::test]
    async fn test_refocus_refreshes_after_stale_request() {
        let gw = gateway(2);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        let mut rx = sync.subscribe();
        gw.hold_listings();
        let guard = sync.focus();
        until(|| gw.list_calls() == 1).await;
        drop(guard);
        let _guard = sync.focus();
        gw.release_listings();

        rx.changed().await.unwrap();
        assert!(sync.read(OrderCollection::is_loaded).await);
        assert_eq!(sync.visible().await.len(), 2);
        assert_eq!(gw.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_navigation_waits_for_outstanding_poll() {
        let gw = gateway(5);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        sync.fetch_page(1).await.unwrap();
        gw.hold_listings();
        let poll = tokio::spawn({
            let sync = sync.clone();
            async move { sync.poll_tick().await }
        });
        until(|| gw.list_calls() == 2).await;
        let nav = tokio::spawn({
            let sync = sync.clone();
            async move { sync.go_to_page(2).await }
        });
        for _ in 0..10 { tokio::task::yield_now().await; }
        assert_eq!(gw.list_calls(), 2);
        gw.release_listings();

        assert_eq!(poll.await.unwrap(), PollOutcome::Fetched(FetchOutcome::Unchanged));
        assert_eq!(nav.await.unwrap().unwrap(), FetchOutcome::Replaced);
        assert_eq!(sync.current_page().await, 2);
        assert_eq!(gw.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_queued_page_steps_apply_in_order() {
        let gw = gateway(5);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        sync.fetch_page(1).await.unwrap();
        let (a, b) = tokio::join!(sync.next_page(), sync.next_page());
        assert_eq!((a.unwrap(), b.unwrap()), (FetchOutcome::Replaced, FetchOutcome::Replaced));
        assert_eq!(sync.current_page().await, 3);
    }

    #[tokio::test]
    async fn test_shrunk_list_falls_back_to_last_page() {
        let gw = gateway(5);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        sync.fetch_page(1).await.unwrap();
        sync.go_to_page(3).await.unwrap();
        gw.remove("1");
        gw.remove("2");

        assert_eq!(sync.poll_tick().await, PollOutcome::Fetched(FetchOutcome::Replaced));
        assert_eq!(sync.current_page().await, 2);
        assert_eq!(sync.read(OrderCollection::total_pages).await, 2);
        let visible = sync.visible().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "3");
    }

    #[tokio::test]
    async fn test_update_order_writes_back_into_view() {
        let gw = gateway(2);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        sync.fetch_page(1).await.unwrap();
        let rx = sync.subscribe();
        let cancelled = sync.visible().await[0].clone().with_status(OrderStatus::Cancelled);
        assert!(sync.update_order(&cancelled).await);
        assert!(rx.has_changed().unwrap());
        assert_eq!(sync.read(|c| c.actionable().len()).await, 1);
        assert_eq!(gw.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_manual_ticks_drive_polling_while_focused() {
        let gw = gateway(2);
        let scheduler = Arc::new(ManualScheduler::new());
        let sync = sync_with(gw.clone(), scheduler.clone());
        let mut rx = sync.subscribe();
        let guard = sync.focus();
        rx.changed().await.unwrap();
        assert_eq!(scheduler.periods(), [Duration::from_secs(30)]);

        gw.set_status("1", OrderStatus::Cancelled);
        until(|| !sync.is_fetching()).await;
        assert_eq!(scheduler.fire(), 1);
        rx.changed().await.unwrap();
        assert_eq!(gw.list_calls(), 2);

        guard.release();
        assert_eq!(scheduler.fire(), 0);
        assert_eq!(scheduler.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_only_while_focused() {
        let gw = gateway(2);
        let sync = sync_with(gw.clone(), Arc::new(IntervalScheduler));
        let guard = sync.focus();
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(gw.list_calls(), 4); // on focus, then at 30s, 60s and 90s
        drop(guard);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(gw.list_calls(), 4);

        let _guard = sync.focus();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(gw.list_calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_burst_runs_one_filter_pass() {
        let gw = Arc::new(InMemoryGateway::with_orders([order(1, "Lara"), order(2, "Latisha"), order(3, "Bruno")]));
        let sync = sync_with(gw, Arc::new(ManualScheduler::new()));
        sync.fetch_page(1).await.unwrap();
        let passes = sync.read(OrderCollection::filter_passes).await;

        sync.search("l").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        sync.search("la").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        sync.search("lat").await;
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(sync.read(OrderCollection::filter_passes).await, passes + 1);
        assert_eq!(sync.read(|c| c.query().to_string()).await, "lat");
        let visible = sync.visible().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].customer_name, "Latisha");
    }

    #[tokio::test]
    async fn test_poll_failures_back_off_and_recover() {
        let gw = gateway(1);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        for _ in 0..3 { gw.fail_next_list(GatewayError::Unavailable("offline".into())); }

        assert_eq!(sync.poll_tick().await, PollOutcome::Failed); // 1st failure, no skip
        assert_eq!(sync.poll_tick().await, PollOutcome::Failed); // 2nd failure, skip 1
        assert_eq!(sync.poll_tick().await, PollOutcome::BackedOff);
        assert_eq!(sync.poll_tick().await, PollOutcome::Failed); // 3rd failure, skip 3
        for _ in 0..3 { assert_eq!(sync.poll_tick().await, PollOutcome::BackedOff); }
        assert_eq!(sync.poll_tick().await, PollOutcome::Fetched(FetchOutcome::Replaced));
        assert_eq!(gw.list_calls(), 4);
        assert_eq!(sync.read(|c| c.last_error().map(str::to_string)).await, None);
    }

    #[tokio::test]
    async fn test_manual_refresh_surfaces_and_clears_error() {
        let gw = gateway(1);
        let sync = sync_with(gw.clone(), Arc::new(ManualScheduler::new()));
        gw.fail_next_list(GatewayError::Unavailable("offline".into()));
        assert!(sync.refresh().await.is_err());
        assert!(sync.read(|c| c.last_error().is_some()).await);
        assert_eq!(sync.refresh().await.unwrap(), FetchOutcome::Replaced);
        assert!(sync.read(|c| c.last_error().is_none()).await);
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut backoff = PollBackoff::default();
        let skips: Vec<u32> = (0..6).map(|_| backoff.record_failure(8)).collect();
        assert_eq!(skips, [0, 1, 3, 7, 8, 8]);
        backoff.record_success();
        assert!(!backoff.should_skip());
    }
}
