//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductError};
pub use order::{FulfillmentStep, Order, OrderError, OrderLine, OrderStatus, PaymentMethod, StepKind, Transition};
pub use cart::{Cart, CartError, CartLine};
