//! Cart Aggregate
//!
//! Weight-priced cart: every line is a product and a number of grams, priced
//! from the product's per-kilogram rate. Totals are kept unrounded and only
//! rounded to cents when shown or submitted.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{PaymentMethod, Product};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::submission::{OrderSubmission, SubmissionLine};
use crate::domain::value_objects::{Grams, Money};

#[derive(Clone, Debug)]
pub struct Cart {
    id: String,
    lines: Vec<CartLine>,
    special_instructions: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartLine {
    product: Arc<Product>,
    grams: Grams,
}

impl CartLine {
    pub fn product(&self) -> &Product { &self.product }
    pub fn grams(&self) -> Grams { self.grams }
    pub fn subtotal(&self) -> Money { self.product.unit_price_per_kg().per_kg_for(self.grams) }
}

impl Default for Cart {
    fn default() -> Self { Self::new() }
}

impl Cart {
    pub fn new() -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4().to_string(), lines: vec![], special_instructions: None, created_at: now, updated_at: now, events: vec![] }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn line(&self, product_id: &str) -> Option<&CartLine> { self.lines.iter().find(|l| l.product.id() == product_id) }
    pub fn line_count(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn total_grams(&self) -> u64 { self.lines.iter().map(|l| u64::from(l.grams.value())).sum() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Unrounded sum of line subtotals.
    pub fn total(&self) -> Money { self.lines.iter().map(CartLine::subtotal).sum() }

    /// Adds 100g of `product`, merging into the existing line if there is one.
    pub fn add_item(&mut self, product: Arc<Product>) -> Grams {
        let grams = match self.lines.iter_mut().find(|l| l.product.id() == product.id()) {
            Some(existing) => {
                existing.grams = existing.grams.saturating_add(Grams::STEP);
                existing.grams
            }
            None => {
                self.lines.push(CartLine { product, grams: Grams::STEP });
                Grams::STEP
            }
        };
        self.touch();
        grams
    }

    /// Replaces a line's weight. Zero grams is rejected and leaves the line as it was.
    pub fn update_grams(&mut self, product_id: &str, grams: u32) -> Result<(), CartError> {
        let grams = Grams::new(grams).map_err(|_| CartError::InvalidGrams(grams))?;
        let line = self.lines.iter_mut().find(|l| l.product.id() == product_id).ok_or_else(|| CartError::ItemNotFound(product_id.to_string()))?;
        line.grams = grams;
        self.touch();
        Ok(())
    }

    /// Returns whether a line was removed.
    pub fn remove_item(&mut self, product_id: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product.id() != product_id);
        let removed = self.lines.len() != before;
        if removed { self.touch(); }
        removed
    }

    pub fn set_special_instructions(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.special_instructions = if text.trim().is_empty() { None } else { Some(text) };
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.special_instructions = None;
        self.touch();
    }

    /// Snapshot for `POST /orders`. Unit prices and subtotals are frozen here so
    /// later catalog price changes cannot alter a submitted order.
    pub fn to_order_payload(&self, customer_id: Option<&str>, branch_id: &str, user_id: &str, payment_method: PaymentMethod) -> Result<OrderSubmission, CartError> {
        if self.is_empty() { return Err(CartError::Empty); }
        let customer_id = customer_id.map(str::trim).filter(|c| !c.is_empty()).ok_or(CartError::MissingCustomer)?;
        let items = self.lines.iter().map(|l| SubmissionLine {
            product_id: l.product.id().to_string(),
            product_name: l.product.name().to_string(),
            quantity: l.grams.as_kg(),
            unit_price: l.product.unit_price_per_kg().amount(),
            subtotal: l.subtotal().rounded().amount(),
        }).collect();
        let submission = OrderSubmission {
            customer_id: customer_id.to_string(),
            branch_id: branch_id.trim().to_string(),
            user_id: user_id.trim().to_string(),
            total_amount: self.total().rounded().amount(),
            payment_method,
            special_instructions: self.special_instructions.clone(),
            items,
        };
        submission.validate()?;
        Ok(submission)
    }

    /// Empties the cart once the backend has accepted its order.
    pub fn complete_submission(&mut self) {
        let event = CartEvent::Submitted { cart_id: self.id.clone(), line_count: self.lines.len(), total: self.total().rounded() };
        self.lines.clear();
        self.special_instructions = None;
        self.touch();
        self.raise_event(DomainEvent::Cart(event));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CartError {
    #[error("the cart is empty")]
    Empty,
    #[error("a customer must be selected")]
    MissingCustomer,
    #[error("{0} grams is not a valid quantity")]
    InvalidGrams(u32),
    #[error("product {0} is not in the cart")]
    ItemNotFound(String),
    #[error("invalid order: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn product(id: &str, name: &str, minor_per_kg: i64) -> Arc<Product> {
        Arc::new(Product::new(id, name, Money::from_minor(minor_per_kg)).unwrap())
    }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new();
        let arabica = product("P1", "Arabica", 4500);
        cart.add_item(arabica.clone());
        assert_eq!(cart.add_item(arabica), Grams::new(200).unwrap());
        assert_eq!(cart.line_count(), 1); // Merged
        assert!(cart.remove_item("P1"));
        assert!(!cart.remove_item("P1"));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_weight_pricing() {
        let mut cart = Cart::new();
        cart.add_item(product("P1", "Arabica", 4500));
        cart.add_item(product("P2", "Robusta", 4500));
        cart.update_grams("P1", 250).unwrap();
        cart.update_grams("P2", 250).unwrap();
        assert_eq!(cart.line("P1").unwrap().subtotal().rounded(), Money::from_minor(1125));
        assert_eq!(cart.total().rounded(), Money::from_minor(2250));
        assert_eq!(cart.total_grams(), 500);
    }

    #[test]
    fn test_zero_grams_keeps_previous_weight() {
        let mut cart = Cart::new();
        cart.add_item(product("P1", "Arabica", 4500));
        cart.update_grams("P1", 340).unwrap();
        assert!(matches!(cart.update_grams("P1", 0), Err(CartError::InvalidGrams(0))));
        assert_eq!(cart.line("P1").unwrap().grams().value(), 340);
        assert!(matches!(cart.update_grams("P9", 10), Err(CartError::ItemNotFound(_))));
    }

    #[test]
    fn test_payload_freezes_prices_and_rounds_total() {
        let mut cart = Cart::new();
        cart.add_item(product("P1", "Arabica", 4500));
        cart.add_item(product("P2", "Milk", 850));
        cart.update_grams("P1", 250).unwrap();
        cart.update_grams("P2", 1000).unwrap();
        cart.set_special_instructions("no lid");
        let payload = cart.to_order_payload(Some("C1"), "B1", "U1", PaymentMethod::Card).unwrap();
        assert_eq!(payload.total_amount, Decimal::new(1975, 2));
        assert_eq!(payload.items[0].quantity, Decimal::new(250, 3));
        assert_eq!(payload.items[0].unit_price, Decimal::new(4500, 2));
        assert_eq!(payload.items[1].subtotal, Decimal::new(850, 2));
        assert_eq!(payload.special_instructions.as_deref(), Some("no lid"));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["total_amount"], serde_json::json!(19.75));
        assert_eq!(json["items"][0]["quantity"], serde_json::json!(0.25));
    }

    #[test]
    fn test_payload_validation() {
        let cart = Cart::new();
        assert!(matches!(cart.to_order_payload(Some("C1"), "B1", "U1", PaymentMethod::Cash), Err(CartError::Empty)));

        let mut cart = Cart::new();
        cart.add_item(product("P1", "Arabica", 4500));
        assert!(matches!(cart.to_order_payload(None, "B1", "U1", PaymentMethod::Cash), Err(CartError::MissingCustomer)));
        assert!(matches!(cart.to_order_payload(Some("  "), "B1", "U1", PaymentMethod::Cash), Err(CartError::MissingCustomer)));
        assert!(matches!(cart.to_order_payload(Some("C1"), "", "U1", PaymentMethod::Cash), Err(CartError::Invalid(_))));
    }

    #[test]
    fn test_complete_submission_empties_cart() {
        let mut cart = Cart::new();
        cart.add_item(product("P1", "Arabica", 4500));
        cart.complete_submission();
        assert!(cart.is_empty());
        let events = cart.take_events();
        assert!(matches!(&events[..], [DomainEvent::Cart(CartEvent::Submitted { line_count: 1, .. })]));
    }

    #[test]
    fn test_clear_keeps_no_events() {
        let mut cart = Cart::new();
        for _ in 0..3 {
            cart.add_item(product("P1", "Arabica", 4500));
            cart.set_special_instructions("to go");
            cart.clear();
        }
        assert!(cart.is_empty());
        assert!(cart.special_instructions.is_none());
        assert!(cart.take_events().is_empty());
    }
}
