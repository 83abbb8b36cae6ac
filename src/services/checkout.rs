//! Cart submission

use tracing::info;
use crate::domain::aggregates::{Cart, Order, PaymentMethod};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::gateway::OrderGateway;
use crate::Result;

/// Who is placing the order and how it is paid.
#[derive(Clone, Debug)]
pub struct CheckoutContext {
    pub customer_id: Option<String>,
    pub branch_id: String,
    pub user_id: String,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone)]
pub struct CheckoutService<G> {
    gateway: G,
}

impl<G: OrderGateway> CheckoutService<G> {
    pub fn new(gateway: G) -> Self { Self { gateway } }

    /// Validates locally, creates the order remotely and empties the cart on success.
    /// On any failure the cart is left untouched so the user can fix and resubmit.
    pub async fn submit(&self, cart: &mut Cart, ctx: &CheckoutContext) -> Result<Order> {
        let submission = cart.to_order_payload(ctx.customer_id.as_deref(), &ctx.branch_id, &ctx.user_id, ctx.payment_method)?;
        let order = self.gateway.create_order(&submission).await?;
        cart.complete_submission();
        for event in cart.take_events() {
            if let DomainEvent::Cart(CartEvent::Submitted { cart_id, line_count, total }) = event {
                info!(%cart_id, order_id = %order.id, line_count, %total, "cart submitted");
            }
        }
        Ok(order)
    }
}
