//! Brew Orders
//!
//! Order core for a coffee-shop operations client.
//!
//! ## Features
//! - Weight-priced cart (grams against a per-kilogram rate) and order submission
//! - Order status state machine and fulfillment checklist, mirrored to the backend with rollback
//! - Paged order list kept in sync by polling, with debounced search and client-side filters

pub mod config;
pub mod domain;
pub mod gateway;
pub mod services;
pub mod sync;

pub use config::{Config, ConfigError};
pub use domain::aggregates::{Cart, CartError, CartLine, FulfillmentStep, Order, OrderError, OrderLine, OrderStatus, PaymentMethod, Product, ProductError, StepKind, Transition};
pub use domain::submission::{OrderSubmission, SubmissionLine};
pub use domain::value_objects::{Grams, Money};
pub use gateway::{GatewayError, HttpOrderGateway, InMemoryGateway, OrderGateway};
pub use services::{CheckoutContext, CheckoutService, FulfillmentService};
pub use sync::{OrderCollection, OrderFilter, OrderSynchronizer, SyncConfig};

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum BrewError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("order {0} no longer exists on the server")]
    OrderGone(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BrewError {
    /// Message suitable for showing to staff.
    pub fn user_message(&self) -> String {
        match self {
            Self::Cart(CartError::Empty) => "Add at least one product before submitting.".into(),
            Self::Cart(CartError::MissingCustomer) => "Select a customer before submitting.".into(),
            Self::Cart(CartError::InvalidGrams(_)) => "Quantity must be at least 1 gram.".into(),
            Self::Cart(e) => e.to_string(),
            Self::Order(e) => format!("This action is not available: {e}."),
            Self::OrderGone(id) => format!("Order #{id} no longer exists. Refresh the list."),
            Self::Gateway(GatewayError::ServerValidation { message, .. }) => message.clone(),
            Self::Gateway(GatewayError::Unauthorized) => "Your session has expired. Sign in again.".into(),
            Self::Gateway(e) if e.is_transient() => "Could not reach the server. Check the connection and try again.".into(),
            Self::Gateway(e) => format!("The server rejected the request: {e}"),
            Self::Config(e) => e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BrewError>;
