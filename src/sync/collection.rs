//! Locally held page of orders and the view derived from it.
//!
//! The backend is authoritative; this is a cache of the last page fetched plus the
//! client-side search, filter and sort applied over it. Both the raw page and the
//! visible view are shared through `Arc`s that are only swapped when their contents
//! actually change, so observers can compare pointers to detect updates.

use std::sync::Arc;
use crate::domain::aggregates::{Order, OrderStatus, PaymentMethod};
use crate::gateway::{OrderPage, SortOrder};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status() == s)
            && self.payment_method.map_or(true, |p| order.payment_method == p)
    }
}

#[derive(Debug, Clone)]
pub struct OrderCollection {
    raw: Arc<Vec<Order>>,
    visible: Arc<Vec<Order>>,
    loaded: bool,
    current_page: u32,
    total_pages: u32,
    total: u64,
    query: String,
    filter: OrderFilter,
    sort: SortOrder,
    last_error: Option<String>,
    revision: u64,
    filter_passes: u64,
}

impl Default for OrderCollection {
    fn default() -> Self { Self::new() }
}

impl OrderCollection {
    pub fn new() -> Self {
        Self {
            raw: Arc::new(vec![]), visible: Arc::new(vec![]), loaded: false,
            current_page: 1, total_pages: 1, total: 0,
            query: String::new(), filter: OrderFilter::default(), sort: SortOrder::Descending,
            last_error: None, revision: 0, filter_passes: 0,
        }
    }

    pub fn raw(&self) -> &Arc<Vec<Order>> { &self.raw }
    pub fn visible(&self) -> &Arc<Vec<Order>> { &self.visible }
    pub fn is_loaded(&self) -> bool { self.loaded }
    pub fn current_page(&self) -> u32 { self.current_page }
    pub fn total_pages(&self) -> u32 { self.total_pages }
    pub fn total(&self) -> u64 { self.total }
    pub fn query(&self) -> &str { &self.query }
    pub fn filter(&self) -> OrderFilter { self.filter }
    pub fn sort(&self) -> SortOrder { self.sort }
    pub fn last_error(&self) -> Option<&str> { self.last_error.as_deref() }
    /// Advances only when the visible view changes.
    pub fn revision(&self) -> u64 { self.revision }
    pub fn filter_passes(&self) -> u64 { self.filter_passes }

    pub fn can_go_to(&self, page: u32) -> bool { (1..=self.total_pages).contains(&page) }

    /// Last valid page when the held page fell off the end after the backend list shrank.
    pub fn clamped_page(&self) -> Option<u32> {
        (self.loaded && self.current_page > self.total_pages).then_some(self.total_pages)
    }

    /// Stores a freshly fetched page. Returns `false` when it matches what is
    /// already held, in which case nothing is replaced or recomputed.
    pub fn apply_page(&mut self, page_number: u32, page: OrderPage) -> bool {
        self.total_pages = page.total_pages.max(1);
        self.total = page.total;
        if self.loaded && self.current_page == page_number && same_orders(&self.raw, &page.items) {
            return false;
        }
        self.loaded = true;
        self.current_page = page_number;
        self.raw = Arc::new(page.items);
        self.refresh_view();
        true
    }

    /// Writes back an order changed locally, e.g. after a confirmed status transition.
    /// Returns `false` if the order is not on the held page or nothing visible changed.
    pub fn replace_order(&mut self, order: &Order) -> bool {
        let Some(index) = self.raw.iter().position(|o| o.id == order.id) else { return false };
        if self.raw[index].same_listing(order) { return false; }
        let mut raw = self.raw.as_ref().clone();
        raw[index] = order.clone();
        self.raw = Arc::new(raw);
        self.refresh_view();
        true
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.refresh_view();
    }

    pub fn set_filter(&mut self, filter: OrderFilter) {
        self.filter = filter;
        self.refresh_view();
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
        self.refresh_view();
    }

    pub fn record_error(&mut self, message: impl Into<String>) { self.last_error = Some(message.into()); }
    pub fn clear_error(&mut self) { self.last_error = None; }

    /// Visible orders staff can still act on; cancelled and completed orders are left out.
    pub fn actionable(&self) -> Vec<&Order> { self.visible.iter().filter(|o| o.status().is_actionable()).collect() }

    /// Count of loaded orders per status, in lifecycle order.
    pub fn status_counts(&self) -> Vec<(OrderStatus, usize)> {
        OrderStatus::ALL.iter().map(|&s| (s, self.raw.iter().filter(|o| o.status() == s).count())).collect()
    }

    fn refresh_view(&mut self) {
        self.filter_passes += 1;
        let needle = self.query.trim().to_lowercase();
        let mut view: Vec<Order> = self.raw.iter()
            .filter(|o| self.filter.matches(o) && matches_query(o, &needle))
            .cloned()
            .collect();
        match self.sort {
            SortOrder::Ascending => view.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SortOrder::Descending => view.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        if !same_orders(&self.visible, &view) {
            self.visible = Arc::new(view);
            self.revision += 1;
        }
    }
}

/// Case-insensitive substring match over customer name, order id, phone and item names.
/// `needle` must already be lower-cased; an empty needle matches everything.
pub fn matches_query(order: &Order, needle: &str) -> bool {
    if needle.is_empty() { return true; }
    let hit = |text: &str| text.to_lowercase().contains(needle);
    hit(&order.customer_name)
        || hit(&order.id)
        || order.customer_phone.as_deref().is_some_and(hit)
        || order.items.iter().filter_map(|i| i.product_name.as_deref()).any(hit)
}

fn same_orders(a: &[Order], b: &[Order]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_listing(y))
}
