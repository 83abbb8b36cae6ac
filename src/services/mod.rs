//! Services that combine aggregates with the order gateway
pub mod checkout;
pub mod fulfillment;

pub use checkout::{CheckoutContext, CheckoutService};
pub use fulfillment::FulfillmentService;
