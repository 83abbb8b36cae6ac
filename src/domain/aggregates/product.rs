//! Product Aggregate
//!
//! Catalog products are owned by the catalog collaborator; this crate only reads
//! them and references them from cart lines.

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: String,
    name: String,
    #[serde(rename = "price_per_kg")]
    unit_price_per_kg: Money,
    #[serde(default)]
    category_id: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit_price_per_kg: Money) -> Result<Self, ProductError> {
        let id = id.into();
        if id.trim().is_empty() { return Err(ProductError::MissingId); }
        if unit_price_per_kg.is_negative() { return Err(ProductError::NegativePrice(unit_price_per_kg)); }
        Ok(Self { id, name: name.into(), unit_price_per_kg, category_id: None })
    }

    pub fn in_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn unit_price_per_kg(&self) -> Money { self.unit_price_per_kg }
    pub fn category_id(&self) -> Option<&str> { self.category_id.as_deref() }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("product id is empty")]
    MissingId,
    #[error("price per kilogram cannot be negative ({0})")]
    NegativePrice(Money),
}
