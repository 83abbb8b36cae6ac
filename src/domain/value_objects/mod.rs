//! Value Objects for order pricing

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// Money value object.
///
/// Keeps full precision while accumulating; callers round with [`Money::rounded`]
/// at the point of display or submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    /// `Money::from_minor(1125)` is 11.25
    pub fn from_minor(minor: i64) -> Self { Self(Decimal::new(minor, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }

    pub fn rounded(&self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Price of `grams` at this per-kilogram rate.
    pub fn per_kg_for(&self, grams: Grams) -> Money { Money(self.0 * grams.as_kg()) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.rounded().0) }
}

/// Weight of a cart line in whole grams, never below one gram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Grams(u32);

impl Grams {
    pub const STEP: Grams = Grams(100);

    pub fn new(value: u32) -> Result<Self, GramsError> {
        if value == 0 { return Err(GramsError::NotPositive); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn as_kg(&self) -> Decimal { Decimal::new(i64::from(self.0), 3) }
    pub fn saturating_add(&self, other: Grams) -> Self { Self(self.0.saturating_add(other.0)) }
}

impl TryFrom<u32> for Grams {
    type Error = GramsError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Grams> for u32 {
    fn from(g: Grams) -> u32 { g.0 }
}

impl fmt::Display for Grams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}g", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GramsError {
    #[error("grams must be at least 1")]
    NotPositive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grams_rejects_zero() {
        assert_eq!(Grams::new(0), Err(GramsError::NotPositive));
        assert_eq!(Grams::new(250).unwrap().as_kg(), Decimal::new(250, 3));
    }

    #[test]
    fn test_money_rounds_only_on_demand() {
        let rate = Money::from_minor(333);
        let line = rate.per_kg_for(Grams::new(125).unwrap());
        assert_eq!(line.amount(), Decimal::new(41625, 5));
        let total: Money = [line, line, line].into_iter().sum();
        assert_eq!(total.amount(), Decimal::new(124875, 5));
        assert_eq!(total.rounded(), Money::from_minor(125));
        assert_eq!(total.to_string(), "1.25");
    }
}
