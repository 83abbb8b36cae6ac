//! Domain events
use crate::domain::aggregates::{OrderStatus, StepKind};
use crate::domain::value_objects::Money;
use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CartEvent {
    Submitted { cart_id: String, line_count: usize, total: Money },
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    StatusChanged { order_id: String, from: OrderStatus, to: OrderStatus },
    StatusRolledBack { order_id: String, from: OrderStatus, to: OrderStatus },
    StepCompleted { order_id: String, step: StepKind, at: DateTime<Utc> },
    ForcedReady { order_id: String, skipped: Vec<StepKind>, at: DateTime<Utc> },
}
