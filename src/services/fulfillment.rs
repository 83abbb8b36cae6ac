//! Order fulfillment
//!
//! Status transitions are applied to the local order first and then mirrored to
//! the gateway. If the gateway refuses or cannot be reached, the local order is
//! rolled back to the status it had before.
//!
//! When attached to an [`OrderSynchronizer`], confirmed transitions are written
//! back into the held list, and an order the backend no longer knows triggers a
//! refresh of the list.

use chrono::Utc;
use tracing::{info, warn};
use crate::domain::aggregates::{Order, StepKind, Transition};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::gateway::{GatewayError, OrderGateway};
use crate::sync::OrderSynchronizer;
use crate::{BrewError, Result};

#[derive(Debug, Clone)]
pub struct FulfillmentService<G> {
    gateway: G,
    list: Option<OrderSynchronizer<G>>,
}

impl<G: OrderGateway + 'static> FulfillmentService<G> {
    pub fn new(gateway: G) -> Self { Self { gateway, list: None } }

    /// Keeps `list` in step with every confirmed transition.
    pub fn with_list(mut self, list: OrderSynchronizer<G>) -> Self {
        self.list = Some(list);
        self
    }

    pub async fn start(&self, order: &mut Order) -> Result<()> { self.transition(order, Transition::Start).await }
    pub async fn complete(&self, order: &mut Order) -> Result<()> { self.transition(order, Transition::Complete).await }
    pub async fn cancel(&self, order: &mut Order) -> Result<()> { self.transition(order, Transition::Cancel).await }

    /// Rejected transitions never reach the gateway.
    pub async fn transition(&self, order: &mut Order, transition: Transition) -> Result<()> {
        let previous = order.apply(transition)?;
        let target = order.status();
        match self.gateway.update_order_status(&order.id, target).await {
            Ok(remote) => {
                order.adopt_status(remote.status());
                drain(order);
                if let Some(list) = &self.list { list.update_order(order).await; }
                Ok(())
            }
            Err(e) => {
                order.roll_back_to(previous);
                warn!(order_id = %order.id, %transition, error = %e, "status update rejected, rolled back");
                drain(order);
                match e {
                    GatewayError::NotFound(_) => {
                        if let Some(list) = &self.list {
                            if let Err(e) = list.refresh().await {
                                warn!(error = %e, "list refresh after missing order failed");
                            }
                        }
                        Err(BrewError::OrderGone(order.id.clone()))
                    }
                    other => Err(BrewError::Gateway(other)),
                }
            }
        }
    }

    /// Completes the next checklist step. Steps must be completed in order.
    pub fn complete_step(&self, order: &mut Order, step: StepKind) -> Result<()> {
        order.complete_step(step, Utc::now())?;
        drain(order);
        Ok(())
    }

    /// Dispatcher override that closes every remaining step at once. The skipped
    /// steps stay flagged as forced on the order.
    pub fn force_ready(&self, order: &mut Order) -> Result<Vec<StepKind>> {
        let skipped = order.force_ready(Utc::now())?;
        drain(order);
        Ok(skipped)
    }
}

fn drain(order: &mut Order) {
    for event in order.take_events() {
        match event {
            DomainEvent::Order(OrderEvent::StatusChanged { order_id, from, to }) => info!(%order_id, %from, %to, "order status changed"),
            DomainEvent::Order(OrderEvent::StatusRolledBack { order_id, from, to }) => info!(%order_id, %from, %to, "order status rolled back"),
            DomainEvent::Order(OrderEvent::StepCompleted { order_id, step, .. }) => info!(%order_id, ?step, "fulfillment step completed"),
            DomainEvent::Order(OrderEvent::ForcedReady { order_id, skipped, .. }) => warn!(%order_id, ?skipped, "order forced ready, steps skipped"),
            DomainEvent::Cart(_) => {}
        }
    }
}
