//! Domain model: catalog products, carts, orders and their events
pub mod aggregates;
pub mod events;
pub mod submission;
pub mod value_objects;
