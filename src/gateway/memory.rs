//! In-memory order backend
//!
//! Behaves like the HTTP API (paging, validation, 404s) and lets callers inject
//! failures or hold list requests open to exercise in-flight behavior.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use validator::Validate;
use crate::domain::aggregates::{Order, OrderLine, OrderStatus};
use crate::domain::submission::OrderSubmission;
use crate::domain::value_objects::Money;
use super::{page_count, GatewayError, ListQuery, OrderGateway, OrderPage, SortOrder};

#[derive(Default)]
struct State {
    orders: Vec<Order>,
    customers: HashMap<String, (String, Option<String>)>,
    next_id: u64,
    list_failures: VecDeque<GatewayError>,
    status_failures: VecDeque<GatewayError>,
}

pub struct InMemoryGateway {
    state: Mutex<State>,
    hold: watch::Sender<bool>,
    list_calls: AtomicUsize,
}

impl Default for InMemoryGateway {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for InMemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGateway").field("orders", &self.state().orders.len()).finish_non_exhaustive()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self { state: Mutex::new(State { next_id: 1, ..State::default() }), hold, list_calls: AtomicUsize::new(0) }
    }

    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let gateway = Self::new();
        for order in orders { gateway.insert(order); }
        gateway
    }

    fn state(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn insert(&self, order: Order) {
        let mut state = self.state();
        if let Ok(n) = order.id.parse::<u64>() { state.next_id = state.next_id.max(n + 1); }
        state.orders.retain(|o| o.id != order.id);
        state.orders.push(order);
    }

    pub fn register_customer(&self, id: impl Into<String>, name: impl Into<String>, phone: Option<String>) {
        self.state().customers.insert(id.into(), (name.into(), phone));
    }

    /// Changes an order as if another device had updated it.
    pub fn set_status(&self, id: &str, status: OrderStatus) -> bool {
        let mut state = self.state();
        match state.orders.iter_mut().find(|o| o.id == id) {
            Some(order) => { order.adopt_status(status); true }
            None => false,
        }
    }

    pub fn remove(&self, id: &str) { self.state().orders.retain(|o| o.id != id); }

    pub fn order(&self, id: &str) -> Option<Order> { self.state().orders.iter().find(|o| o.id == id).cloned() }
    pub fn orders(&self) -> Vec<Order> { self.state().orders.clone() }
    pub fn list_calls(&self) -> usize { self.list_calls.load(Ordering::SeqCst) }

    pub fn fail_next_list(&self, error: GatewayError) { self.state().list_failures.push_back(error); }
    pub fn fail_next_status_update(&self, error: GatewayError) { self.state().status_failures.push_back(error); }

    /// List requests block until [`InMemoryGateway::release_listings`].
    pub fn hold_listings(&self) { self.hold.send_replace(true); }
    pub fn release_listings(&self) { self.hold.send_replace(false); }
}

#[async_trait]
impl OrderGateway for InMemoryGateway {
    async fn list_orders(&self, query: ListQuery) -> Result<OrderPage, GatewayError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut held = self.hold.subscribe();
        if held.wait_for(|held| !*held).await.is_err() {
            return Err(GatewayError::Unavailable("backend shut down".into()));
        }

        let mut state = self.state();
        if let Some(error) = state.list_failures.pop_front() { return Err(error); }
        let mut orders = state.orders.clone();
        drop(state);

        orders.sort_by(|a, b| match query.sort {
            SortOrder::Ascending => a.created_at.cmp(&b.created_at),
            SortOrder::Descending => b.created_at.cmp(&a.created_at),
        });
        let total = orders.len() as u64;
        let size = query.page_size.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * size;
        let items = orders.into_iter().skip(skip).take(size).collect();
        Ok(OrderPage { items, total, total_pages: page_count(total, query.page_size) })
    }

    async fn create_order(&self, submission: &OrderSubmission) -> Result<Order, GatewayError> {
        if let Err(errors) = submission.validate() {
            let fields: BTreeMap<String, Vec<String>> = errors.field_errors().into_iter()
                .map(|(field, errs)| (field.to_string(), errs.iter().map(|e| e.code.to_string()).collect()))
                .collect();
            return Err(GatewayError::ServerValidation { message: "The given data was invalid.".into(), fields });
        }

        let mut state = self.state();
        let id = state.next_id.to_string();
        state.next_id += 1;
        let (name, phone) = state.customers.get(&submission.customer_id).cloned().unwrap_or_else(|| (submission.customer_id.clone(), None));
        let items = submission.items.iter().map(|l| OrderLine {
            product_id: l.product_id.clone(),
            product_name: Some(l.product_name.clone()).filter(|n| !n.is_empty()),
            quantity_kg: l.quantity,
            unit_price: Money::new(l.unit_price),
            subtotal: Money::new(l.subtotal),
        }).collect();
        let mut order = Order::placed(id, submission.customer_id.clone(), name, submission.branch_id.clone(), items, Money::new(submission.total_amount), submission.payment_method, Utc::now());
        order.customer_phone = phone;
        order.special_instructions = submission.special_instructions.clone();
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<Order, GatewayError> {
        let mut state = self.state();
        if let Some(error) = state.status_failures.pop_front() { return Err(error); }
        let order = state.orders.iter_mut().find(|o| o.id == id).ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        order.adopt_status(status);
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::PaymentMethod;
    use chrono::{Duration, TimeZone};

    fn order(id: &str, minutes: i64) -> Order {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes);
        Order::placed(id, "C1", "Ana", "B1", vec![], Money::from_minor(100), PaymentMethod::Cash, at)
    }

    #[tokio::test]
    async fn test_lists_newest_first_in_pages() {
        let gateway = InMemoryGateway::with_orders((1..=5).map(|i| order(&i.to_string(), i)));
        let page = gateway.list_orders(ListQuery { page: 1, page_size: 2, sort: SortOrder::Descending }).await.unwrap();
        assert_eq!(page.items.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(), ["5", "4"]);
        assert_eq!(page.total_pages, 3);
        let last = gateway.list_orders(ListQuery { page: 3, page_size: 2, sort: SortOrder::Descending }).await.unwrap();
        assert_eq!(last.items.len(), 1);
    }

    #[tokio::test]
    async fn test_status_update_unknown_order() {
        let gateway = InMemoryGateway::new();
        let err = gateway.update_order_status("9", OrderStatus::InProgress).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(id) if id == "9"));
    }

    #[tokio::test]
    async fn test_injected_list_failure_is_consumed_once() {
        let gateway = InMemoryGateway::with_orders([order("1", 0)]);
        gateway.fail_next_list(GatewayError::Unavailable("boom".into()));
        let query = ListQuery { page: 1, page_size: 10, sort: SortOrder::Descending };
        assert!(gateway.list_orders(query).await.is_err());
        assert!(gateway.list_orders(query).await.is_ok());
        assert_eq!(gateway.list_calls(), 2);
    }
}
