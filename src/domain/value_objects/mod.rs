//! Value objects shared across the storefront domain.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object.
///
/// Normalized to uppercase with surrounding whitespace removed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() {
            return Err(SkuError::Empty);
        }
        if value.len() > 50 {
            return Err(SkuError::TooLong(value.len()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SkuError {
    #[error("sku: must not be empty")]
    Empty,
    #[error("sku: {0} characters exceeds the 50 character limit")]
    TooLong(usize),
}

/// Money value object: a decimal amount tagged with an ISO-4217 currency code.
///
/// Arithmetic across differing currencies is refused rather than converted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self { amount, currency: currency.to_string() }
    }

    pub fn zero(currency: &str) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.check_currency(other)?;
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        self.check_currency(other)?;
        Ok(Money::new(self.amount - other.amount, &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Money {
        Money::new(self.amount * Decimal::from(qty), &self.currency)
    }

    fn check_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(())
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero("USD")
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[derive(Debug, Clone, Error)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

/// Non-negative stock count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn add(&self, other: u32) -> Self {
        Self(self.0.saturating_add(other))
    }

    /// Checked removal: `None` when it would take the count below zero.
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 {
            None
        } else {
            Some(Self(self.0 - other))
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_is_normalized() {
        let sku = Sku::new("  hvac-compressor-01 ").unwrap();
        assert_eq!(sku.as_str(), "HVAC-COMPRESSOR-01");
    }

    #[test]
    fn sku_rejects_empty() {
        assert!(Sku::new("   ").is_err());
    }

    #[test]
    fn money_add_and_subtract() {
        let a = Money::new(Decimal::new(15000, 2), "USD");
        let b = Money::new(Decimal::new(2500, 2), "USD");
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(17500, 2));
        assert_eq!(a.subtract(&b).unwrap().amount(), Decimal::new(12500, 2));
    }

    #[test]
    fn money_refuses_cross_currency() {
        let usd = Money::new(Decimal::ONE, "USD");
        let cad = Money::new(Decimal::ONE, "CAD");
        assert!(usd.add(&cad).is_err());
        assert!(usd.subtract(&cad).is_err());
    }

    #[test]
    fn money_multiply_by_quantity() {
        let unit = Money::new(Decimal::new(99999, 2), "USD");
        assert_eq!(unit.multiply(3).amount(), Decimal::new(299997, 2));
    }

    #[test]
    fn quantity_never_goes_negative() {
        let q = Quantity::new(5);
        assert_eq!(q.subtract(5).unwrap().value(), 0);
        assert!(q.subtract(6).is_none());
    }
}
