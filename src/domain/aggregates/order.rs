//! Order Aggregate
//!
//! An order moves `pending -> in-progress -> completed`, with `cancelled` reachable
//! from either non-terminal state. Separately it carries a fixed checklist of
//! fulfillment steps that must be completed in order, unless a dispatcher uses
//! [`Order::force_ready`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default, deserialize_with = "flexible_id")]
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub branch_id: String,
    #[serde(default)]
    pub items: Vec<OrderLine>,
    pub total_amount: Money,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub estimated_ready_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default = "FulfillmentStep::checklist")]
    steps: Vec<FulfillmentStep>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Frozen copy of a cart line taken when the order was submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(deserialize_with = "flexible_id")]
    pub product_id: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(rename = "quantity")]
    pub quantity_kg: Decimal,
    pub unit_price: Money,
    pub subtotal: Money,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[default]
    Pending,
    #[serde(alias = "in_progress")]
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [Self::Pending, Self::InProgress, Self::Completed, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Completed | Self::Cancelled) }

    /// Orders staff can still act on.
    pub fn is_actionable(&self) -> bool { !self.is_terminal() }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Transfer,
    #[serde(other)]
    Other,
}

/// Requested state-machine move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition { Start, Complete, Cancel }

impl Transition {
    pub fn target(&self) -> OrderStatus {
        match self {
            Self::Start => OrderStatus::InProgress,
            Self::Complete => OrderStatus::Completed,
            Self::Cancel => OrderStatus::Cancelled,
        }
    }

    fn allowed_from(&self, status: OrderStatus) -> bool {
        match self {
            Self::Start => status == OrderStatus::Pending,
            Self::Complete => status == OrderStatus::InProgress,
            Self::Cancel => !status.is_terminal(),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Start => "start", Self::Complete => "complete", Self::Cancel => "cancel" })
    }
}

/// Fixed preparation checklist, in the order the steps must be performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind { Received, PaymentProcessed, Preparing, QualityCheck, Ready }

impl StepKind {
    pub const ALL: [StepKind; 5] = [Self::Received, Self::PaymentProcessed, Self::Preparing, Self::QualityCheck, Self::Ready];

    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Received => 1,
            Self::PaymentProcessed => 2,
            Self::Preparing => 3,
            Self::QualityCheck => 4,
            Self::Ready => 5,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Received => "Order received",
            Self::PaymentProcessed => "Payment processed",
            Self::Preparing => "Preparing",
            Self::QualityCheck => "Quality check",
            Self::Ready => "Ready for pickup",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Received => "The branch has accepted the order",
            Self::PaymentProcessed => "Payment has been confirmed",
            Self::Preparing => "Products are being weighed and packed",
            Self::QualityCheck => "Weights and items verified against the order",
            Self::Ready => "The order can be handed to the customer",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentStep {
    pub kind: StepKind,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the step was closed by a forced "ready" rather than performed.
    #[serde(default)]
    pub forced: bool,
}

impl FulfillmentStep {
    pub fn checklist() -> Vec<FulfillmentStep> {
        StepKind::ALL.iter().map(|&kind| FulfillmentStep { kind, completed_at: None, forced: false }).collect()
    }
    pub fn ordinal(&self) -> u8 { self.kind.ordinal() }
    pub fn title(&self) -> &'static str { self.kind.title() }
    pub fn description(&self) -> &'static str { self.kind.description() }
    pub fn is_completed(&self) -> bool { self.completed_at.is_some() }
}

impl Order {
    /// Builds the order the backend would return for a fresh submission.
    pub fn placed(id: impl Into<String>, customer_id: impl Into<String>, customer_name: impl Into<String>, branch_id: impl Into<String>, items: Vec<OrderLine>, total_amount: Money, payment_method: PaymentMethod, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(), customer_id: customer_id.into(), customer_name: customer_name.into(), customer_phone: None,
            branch_id: branch_id.into(), items, total_amount, payment_method, status: OrderStatus::Pending,
            created_at, estimated_ready_at: None, special_instructions: None,
            steps: FulfillmentStep::checklist(), events: vec![],
        }
    }

    pub fn status(&self) -> OrderStatus { self.status }
    pub fn steps(&self) -> &[FulfillmentStep] { &self.steps }
    pub fn current_step(&self) -> Option<&FulfillmentStep> { self.steps.iter().find(|s| !s.is_completed()) }
    pub fn is_ready(&self) -> bool { self.steps.iter().all(FulfillmentStep::is_completed) }

    /// Field-by-field comparison of everything an order list displays.
    pub fn same_listing(&self, other: &Order) -> bool {
        self.id == other.id
            && self.customer_id == other.customer_id
            && self.customer_name == other.customer_name
            && self.customer_phone == other.customer_phone
            && self.total_amount == other.total_amount
            && self.status == other.status
            && self.created_at == other.created_at
            && self.estimated_ready_at == other.estimated_ready_at
            && self.payment_method == other.payment_method
            && self.special_instructions == other.special_instructions
            && self.items == other.items
    }

    pub fn start(&mut self) -> Result<OrderStatus, OrderError> { self.apply(Transition::Start) }
    pub fn complete(&mut self) -> Result<OrderStatus, OrderError> { self.apply(Transition::Complete) }
    pub fn cancel(&mut self) -> Result<OrderStatus, OrderError> { self.apply(Transition::Cancel) }

    /// Applies `transition` and returns the status it replaced. Rejected moves leave the order untouched.
    pub fn apply(&mut self, transition: Transition) -> Result<OrderStatus, OrderError> {
        let from = self.status;
        if !transition.allowed_from(from) { return Err(OrderError::InvalidTransition { from, transition }); }
        self.status = transition.target();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id.clone(), from, to: self.status }));
        Ok(from)
    }

    /// Undoes an optimistic transition the backend refused.
    pub fn roll_back_to(&mut self, previous: OrderStatus) {
        let from = self.status;
        self.status = previous;
        self.raise_event(DomainEvent::Order(OrderEvent::StatusRolledBack { order_id: self.id.clone(), from, to: previous }));
    }

    /// Takes the status the backend reports as authoritative.
    pub fn adopt_status(&mut self, status: OrderStatus) { self.status = status; }

    pub fn complete_step(&mut self, kind: StepKind, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure_open()?;
        if let Some(blocking) = self.steps.iter().take_while(|s| s.kind != kind).find(|s| !s.is_completed()) {
            return Err(OrderError::StepOutOfOrder { step: kind, blocked_by: blocking.kind });
        }
        let step = self.steps.iter_mut().find(|s| s.kind == kind).ok_or(OrderError::UnknownStep(kind))?;
        if step.is_completed() { return Err(OrderError::StepAlreadyCompleted(kind)); }
        step.completed_at = Some(at);
        self.raise_event(DomainEvent::Order(OrderEvent::StepCompleted { order_id: self.id.clone(), step: kind, at }));
        Ok(())
    }

    /// Closes every remaining step at once. Steps closed this way are flagged `forced`.
    pub fn force_ready(&mut self, at: DateTime<Utc>) -> Result<Vec<StepKind>, OrderError> {
        self.ensure_open()?;
        let mut skipped = vec![];
        for step in self.steps.iter_mut().filter(|s| !s.is_completed()) {
            step.completed_at = Some(at);
            step.forced = true;
            skipped.push(step.kind);
        }
        if !skipped.is_empty() {
            self.raise_event(DomainEvent::Order(OrderEvent::ForcedReady { order_id: self.id.clone(), skipped: skipped.clone(), at }));
        }
        Ok(skipped)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    pub(crate) fn with_status(mut self, status: OrderStatus) -> Self { self.status = status; self }

    fn ensure_open(&self) -> Result<(), OrderError> {
        if self.status.is_terminal() { return Err(OrderError::Closed(self.status)); }
        Ok(())
    }

    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("cannot {transition} an order that is {from}")]
    InvalidTransition { from: OrderStatus, transition: Transition },
    #[error("order is {0} and can no longer change")]
    Closed(OrderStatus),
    #[error("step {0:?} is not part of this order's checklist")]
    UnknownStep(StepKind),
    #[error("step {0:?} is already completed")]
    StepAlreadyCompleted(StepKind),
    #[error("step {step:?} cannot be completed before {blocked_by:?}")]
    StepOutOfOrder { step: StepKind, blocked_by: StepKind },
}

/// Accepts ids sent either as JSON strings or integers.
pub(crate) fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId { Text(String), Number(i64) }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
