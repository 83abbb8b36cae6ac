//! Remote order gateway
//!
//! The core only talks to the backend through [`OrderGateway`]. [`HttpOrderGateway`]
//! speaks the JSON-over-HTTP API; [`InMemoryGateway`] keeps orders in memory for
//! tests and offline demos.

mod http;
mod memory;

pub use http::{HttpGatewayConfig, HttpOrderGateway};
pub use memory::InMemoryGateway;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::submission::OrderSubmission;

#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn list_orders(&self, query: ListQuery) -> Result<OrderPage, GatewayError>;
    async fn create_order(&self, submission: &OrderSubmission) -> Result<Order, GatewayError>;
    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<Order, GatewayError>;
}

#[async_trait]
impl<G: OrderGateway + ?Sized> OrderGateway for Arc<G> {
    async fn list_orders(&self, query: ListQuery) -> Result<OrderPage, GatewayError> { (**self).list_orders(query).await }
    async fn create_order(&self, submission: &OrderSubmission) -> Result<Order, GatewayError> { (**self).create_order(submission).await }
    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<Order, GatewayError> { (**self).update_order_status(id, status).await }
}

/// Orders are always listed by creation time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn as_query(&self) -> &'static str {
        match self { Self::Ascending => "asc", Self::Descending => "desc" }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort: SortOrder,
}

#[derive(Clone, Debug)]
pub struct OrderPage {
    pub items: Vec<Order>,
    pub total: u64,
    pub total_pages: u32,
}

/// Page count for `total` items, never less than one.
pub fn page_count(total: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    u32::try_from(total.div_ceil(size)).unwrap_or(u32::MAX).max(1)
}

/// Supplies the bearer token for each request. Storage and refresh live elsewhere.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> { self.0.clone() }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("authentication required")]
    Unauthorized,
    #[error("order {0} not found")]
    NotFound(String),
    #[error("{message}")]
    ServerValidation { message: String, fields: BTreeMap<String, Vec<String>> },
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Failures worth retrying without changing the request.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Unavailable(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Decode(_) | Self::Unauthorized | Self::NotFound(_) | Self::ServerValidation { .. } => false,
        }
    }

    pub fn field_errors(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::ServerValidation { fields, .. } => Some(fields),
            _ => None,
        }
    }
}
