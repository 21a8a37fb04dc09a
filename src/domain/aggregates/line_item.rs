//! Line items, shared between the cart and order aggregates.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Money;

/// Input that violates a field-level constraint.
///
/// The field name is part of the error so the API layer can point at the
/// offending value.
#[derive(Debug, Clone, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// A single product variant plus quantity and price within a cart or order.
///
/// Product and variant names and the SKU are denormalized snapshots taken at
/// the time the line was created, so later catalog edits do not rewrite
/// history. `line_total` is always derived from quantity and unit price,
/// never stored.
#[derive(Clone, Debug, Serialize)]
pub struct LineItem {
    product_id: Uuid,
    variant_id: Uuid,
    product_name: String,
    variant_name: String,
    sku: String,
    quantity: u32,
    unit_price: Money,
}

impl LineItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        product_id: Uuid,
        variant_id: Uuid,
        product_name: impl Into<String>,
        variant_name: impl Into<String>,
        sku: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, ValidationError> {
        let product_name = product_name.into();
        let variant_name = variant_name.into();
        let sku = sku.into();
        if product_name.trim().is_empty() {
            return Err(ValidationError::new("product_name", "must not be empty"));
        }
        if variant_name.trim().is_empty() {
            return Err(ValidationError::new("variant_name", "must not be empty"));
        }
        if sku.trim().is_empty() {
            return Err(ValidationError::new("sku", "must not be empty"));
        }
        check_quantity(quantity)?;
        check_unit_price(&unit_price)?;
        Ok(Self { product_id, variant_id, product_name, variant_name, sku, quantity, unit_price })
    }

    pub fn product_id(&self) -> Uuid {
        self.product_id
    }

    pub fn variant_id(&self) -> Uuid {
        self.variant_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn variant_name(&self) -> &str {
        &self.variant_name
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> &Money {
        &self.unit_price
    }

    pub fn set_quantity(&mut self, quantity: u32) -> Result<(), ValidationError> {
        check_quantity(quantity)?;
        self.quantity = quantity;
        Ok(())
    }

    pub fn set_unit_price(&mut self, unit_price: Money) -> Result<(), ValidationError> {
        check_unit_price(&unit_price)?;
        self.unit_price = unit_price;
        Ok(())
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

fn check_quantity(quantity: u32) -> Result<(), ValidationError> {
    if quantity == 0 {
        return Err(ValidationError::new("quantity", "must be greater than zero"));
    }
    Ok(())
}

fn check_unit_price(unit_price: &Money) -> Result<(), ValidationError> {
    if unit_price.is_negative() {
        return Err(ValidationError::new(
            "unit_price",
            format!("must not be negative, got {}", unit_price.amount()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn item(quantity: u32, cents: i64) -> Result<LineItem, ValidationError> {
        LineItem::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Mini-Split Heat Pump",
            "12k BTU",
            "FL-MS-12K",
            quantity,
            Money::new(Decimal::new(cents, 2), "USD"),
        )
    }

    #[test]
    fn line_total_tracks_quantity_and_price() {
        let mut line = item(2, 15000).unwrap();
        assert_eq!(line.line_total().amount(), Decimal::new(30000, 2));
        line.set_quantity(3).unwrap();
        assert_eq!(line.line_total().amount(), Decimal::new(45000, 2));
        line.set_unit_price(Money::new(Decimal::new(10000, 2), "USD")).unwrap();
        assert_eq!(line.line_total().amount(), Decimal::new(30000, 2));
    }

    #[test]
    fn zero_quantity_rejected_with_field() {
        let err = item(0, 15000).unwrap_err();
        assert_eq!(err.field, "quantity");
    }

    #[test]
    fn negative_price_rejected_with_field() {
        let err = item(1, -1).unwrap_err();
        assert_eq!(err.field, "unit_price");
    }

    #[test]
    fn blank_snapshot_fields_rejected() {
        let err = LineItem::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "  ",
            "12k BTU",
            "FL-MS-12K",
            1,
            Money::default(),
        )
        .unwrap_err();
        assert_eq!(err.field, "product_name");
    }

    #[test]
    fn setters_revalidate() {
        let mut line = item(1, 100).unwrap();
        assert!(line.set_quantity(0).is_err());
        assert_eq!(line.quantity(), 1);
        assert!(line.set_unit_price(Money::new(Decimal::new(-5, 0), "USD")).is_err());
        assert_eq!(line.unit_price().amount(), Decimal::new(100, 2));
    }
}
