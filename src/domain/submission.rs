//! Order submission payload sent to `POST /orders`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::domain::aggregates::PaymentMethod;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct OrderSubmission {
    #[validate(length(min = 1))]
    pub customer_id: String,
    #[validate(length(min = 1))]
    pub branch_id: String,
    #[validate(length(min = 1))]
    pub user_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<SubmissionLine>,
}

/// One line with its price frozen at submission time; `quantity` is in kilograms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionLine {
    pub product_id: String,
    #[serde(skip)]
    pub product_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}
