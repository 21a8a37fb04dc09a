//! Product aggregate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::line_item::ValidationError;
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Money, Quantity, Sku, SkuError};

/// A sellable variant of a product (capacity, voltage, finish and so on).
/// Cart and order lines reference variants, never bare products.
#[derive(Clone, Debug, Serialize)]
pub struct Variant {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub price: Money,
    pub stock: Quantity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<ProductStatus> {
        match value {
            "draft" => Some(ProductStatus::Draft),
            "active" => Some(ProductStatus::Active),
            "archived" => Some(ProductStatus::Archived),
            _ => None,
        }
    }
}

/// Stored fields used to rehydrate a [`Product`] from persistence.
#[derive(Clone, Debug)]
pub struct ProductParts {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub stock: u32,
    pub status: ProductStatus,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog entry for a piece of equipment.
#[derive(Clone, Debug, Serialize)]
pub struct Product {
    id: Uuid,
    sku: Sku,
    name: String,
    description: String,
    price: Money,
    compare_at_price: Option<Money>,
    stock: Quantity,
    status: ProductStatus,
    category_id: Option<Uuid>,
    tags: Vec<String>,
    variants: Vec<Variant>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    pending_events: Vec<DomainEvent>,
}

#[derive(Debug, Clone, Error)]
pub enum ProductError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Sku(#[from] SkuError),
    #[error("product has no name")]
    MissingName,
    #[error("insufficient stock: {requested} requested, {available} available")]
    InsufficientStock { requested: u32, available: u32 },
    #[error("no variant {variant_id}")]
    VariantNotFound { variant_id: Uuid },
}

impl Product {
    pub fn new(sku: Sku, name: impl Into<String>, price: Money) -> Result<Self, ProductError> {
        let name = name.into();
        if price.is_negative() {
            return Err(ValidationError::new("price", "must not be negative").into());
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            sku,
            name,
            description: String::new(),
            price,
            compare_at_price: None,
            stock: Quantity::default(),
            status: ProductStatus::Draft,
            category_id: None,
            tags: vec![],
            variants: vec![],
            created_at: now,
            updated_at: now,
            pending_events: vec![],
        })
    }

    /// Rehydrates a product from persistence; stored values are taken
    /// as-is.
    pub fn from_parts(parts: ProductParts, variants: Vec<Variant>) -> Self {
        Self {
            id: parts.id,
            sku: parts.sku,
            name: parts.name,
            description: parts.description,
            price: parts.price,
            compare_at_price: parts.compare_at_price,
            stock: Quantity::new(parts.stock),
            status: parts.status,
            category_id: parts.category_id,
            tags: parts.tags,
            variants,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            pending_events: vec![],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn price(&self) -> &Money {
        &self.price
    }

    pub fn compare_at_price(&self) -> Option<&Money> {
        self.compare_at_price.as_ref()
    }

    pub fn stock(&self) -> Quantity {
        self.stock
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn category_id(&self) -> Option<Uuid> {
        self.category_id
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_in_stock(&self) -> bool {
        !self.stock.is_zero() || self.variants.iter().any(|v| !v.stock.is_zero())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ProductError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::new("name", "must not be empty").into());
        }
        self.name = name;
        self.touch();
        Ok(())
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.touch();
    }

    pub fn set_category(&mut self, category_id: Option<Uuid>) {
        self.category_id = category_id;
        self.touch();
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
            self.touch();
        }
    }

    pub fn set_price(&mut self, price: Money) -> Result<(), ProductError> {
        if price.is_negative() {
            return Err(ValidationError::new("price", "must not be negative").into());
        }
        self.price = price;
        self.touch();
        Ok(())
    }

    pub fn set_compare_at_price(&mut self, price: Option<Money>) -> Result<(), ProductError> {
        if let Some(p) = &price {
            if p.is_negative() {
                return Err(ValidationError::new("compare_at_price", "must not be negative").into());
            }
        }
        self.compare_at_price = price;
        self.touch();
        Ok(())
    }

    pub fn add_variant(
        &mut self,
        sku: Sku,
        name: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Result<Uuid, ProductError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::new("variant_name", "must not be empty").into());
        }
        if price.is_negative() {
            return Err(ValidationError::new("variant_price", "must not be negative").into());
        }
        let id = Uuid::new_v4();
        self.variants.push(Variant { id, sku, name, price, stock: Quantity::new(stock) });
        self.touch();
        Ok(id)
    }

    /// A draft product needs a name before it can go live.
    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() {
            return Err(ProductError::MissingName);
        }
        self.status = ProductStatus::Active;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) {
        self.status = ProductStatus::Archived;
        self.touch();
    }

    pub fn add_stock(&mut self, qty: u32) {
        self.stock = self.stock.add(qty);
        self.touch();
        self.raise_stock_event();
    }

    /// Stock can never go below zero; a removal larger than the count on
    /// hand fails and leaves it untouched.
    pub fn remove_stock(&mut self, qty: u32) -> Result<(), ProductError> {
        self.stock = self.stock.subtract(qty).ok_or(ProductError::InsufficientStock {
            requested: qty,
            available: self.stock.value(),
        })?;
        self.touch();
        self.raise_stock_event();
        Ok(())
    }

    pub fn add_variant_stock(&mut self, variant_id: Uuid, qty: u32) -> Result<(), ProductError> {
        let variant = self.variant_mut(variant_id)?;
        variant.stock = variant.stock.add(qty);
        self.touch();
        Ok(())
    }

    pub fn remove_variant_stock(&mut self, variant_id: Uuid, qty: u32) -> Result<(), ProductError> {
        let variant = self.variant_mut(variant_id)?;
        variant.stock = variant.stock.subtract(qty).ok_or(ProductError::InsufficientStock {
            requested: qty,
            available: variant.stock.value(),
        })?;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn variant_mut(&mut self, variant_id: Uuid) -> Result<&mut Variant, ProductError> {
        self.variants
            .iter_mut()
            .find(|v| v.id == variant_id)
            .ok_or(ProductError::VariantNotFound { variant_id })
    }

    fn raise_stock_event(&mut self) {
        self.pending_events.push(DomainEvent::ProductStockAdjusted {
            product_id: self.id,
            sku: self.sku.as_str().to_string(),
            stock: self.stock.value(),
        });
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn product() -> Product {
        Product::new(
            Sku::new("FL-AHU-200").unwrap(),
            "Air Handler 2000",
            Money::new(Decimal::new(249900, 2), "USD"),
        )
        .unwrap()
    }

    #[test]
    fn stock_cannot_go_below_zero() {
        let mut p = product();
        p.add_stock(10);
        p.remove_stock(4).unwrap();
        assert_eq!(p.stock().value(), 6);
        let err = p.remove_stock(7).unwrap_err();
        assert!(matches!(err, ProductError::InsufficientStock { requested: 7, available: 6 }));
        assert_eq!(p.stock().value(), 6);
    }

    #[test]
    fn negative_price_rejected() {
        let mut p = product();
        assert!(p.set_price(Money::new(Decimal::new(-1, 0), "USD")).is_err());
        assert_eq!(p.price().amount(), Decimal::new(249900, 2));
    }

    #[test]
    fn publish_requires_a_name() {
        let mut p = product();
        p.publish().unwrap();
        assert_eq!(p.status(), ProductStatus::Active);
    }

    #[test]
    fn variant_stock_is_tracked_per_variant() {
        let mut p = product();
        let v = p
            .add_variant(
                Sku::new("FL-AHU-200-230V").unwrap(),
                "230V",
                Money::new(Decimal::new(259900, 2), "USD"),
                3,
            )
            .unwrap();
        p.remove_variant_stock(v, 2).unwrap();
        assert_eq!(p.variant(v).unwrap().stock.value(), 1);
        assert!(p.remove_variant_stock(v, 2).is_err());
        assert!(p.is_in_stock());
    }

    #[test]
    fn stock_adjustments_raise_events() {
        let mut p = product();
        p.add_stock(5);
        p.remove_stock(1).unwrap();
        let events = p.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], DomainEvent::ProductStockAdjusted { stock: 4, .. }));
    }
}
