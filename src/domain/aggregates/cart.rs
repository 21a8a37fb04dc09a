//! Cart aggregate.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::line_item::{LineItem, ValidationError};
use crate::domain::value_objects::{Money, MoneyError};

/// How long a fresh cart lives before housekeeping may reclaim it.
const DEFAULT_TTL_DAYS: i64 = 30;

/// A shopping cart for either an authenticated user or a guest session.
///
/// Exactly one of `user_id` / `session_id` is set; the two constructors are
/// the only way to build one. Lines are keyed uniquely by variant: adding a
/// variant that is already present merges quantities and keeps the original
/// unit price.
#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    id: Uuid,
    user_id: Option<Uuid>,
    session_id: Option<String>,
    currency: String,
    items: Vec<LineItem>,
    subtotal: Money,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
pub enum CartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Currency(#[from] MoneyError),
    #[error("no cart line for variant {variant_id}")]
    ItemNotFound { variant_id: Uuid },
}

impl Cart {
    pub fn for_user(user_id: Uuid, currency: &str) -> Self {
        Self::build(Some(user_id), None, currency)
    }

    pub fn for_session(session_id: impl Into<String>, currency: &str) -> Self {
        Self::build(None, Some(session_id.into()), currency)
    }

    fn build(user_id: Option<Uuid>, session_id: Option<String>, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_id,
            currency: currency.to_string(),
            items: vec![],
            subtotal: Money::zero(currency),
            expires_at: now + Duration::days(DEFAULT_TTL_DAYS),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrates a cart from persistence. Stored values are taken as-is;
    /// only the cached subtotal is recomputed from the lines.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        user_id: Option<Uuid>,
        session_id: Option<String>,
        currency: &str,
        items: Vec<LineItem>,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut cart = Self {
            id,
            user_id,
            session_id,
            currency: currency.to_string(),
            items,
            subtotal: Money::zero(currency),
            expires_at,
            created_at,
            updated_at,
        };
        cart.subtotal = cart.computed_subtotal();
        cart
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, variant_id: Uuid) -> Option<&LineItem> {
        self.items.iter().find(|i| i.variant_id() == variant_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of line quantities across the cart.
    pub fn total_items(&self) -> u32 {
        self.items.iter().map(LineItem::quantity).sum()
    }

    pub fn subtotal(&self) -> &Money {
        &self.subtotal
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Adds a line, merging into an existing line for the same variant.
    ///
    /// Merging only increments the quantity; the unit price of the existing
    /// line is kept.
    pub fn add_item(&mut self, item: LineItem) -> Result<(), CartError> {
        if item.unit_price().currency() != self.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: item.unit_price().currency().to_string(),
            }
            .into());
        }
        match self.items.iter_mut().find(|i| i.variant_id() == item.variant_id()) {
            Some(existing) => {
                let merged = existing.quantity().saturating_add(item.quantity());
                existing.set_quantity(merged)?;
            }
            None => self.items.push(item),
        }
        self.recalculate();
        Ok(())
    }

    /// Removes the line for `variant_id`; absent lines are a no-op.
    pub fn remove_item(&mut self, variant_id: Uuid) {
        let before = self.items.len();
        self.items.retain(|i| i.variant_id() != variant_id);
        if self.items.len() != before {
            self.recalculate();
        }
    }

    /// Overwrites a line's quantity. Zero or negative removes the line, so a
    /// non-positive quantity can never exist on a stored line.
    pub fn update_item_quantity(&mut self, variant_id: Uuid, quantity: i64) -> Result<(), CartError> {
        let Some(pos) = self.items.iter().position(|i| i.variant_id() == variant_id) else {
            return Err(CartError::ItemNotFound { variant_id });
        };
        if quantity <= 0 {
            self.items.remove(pos);
        } else {
            let quantity = u32::try_from(quantity).map_err(|_| {
                ValidationError::new("quantity", format!("{quantity} is out of range"))
            })?;
            self.items[pos].set_quantity(quantity)?;
        }
        self.recalculate();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.recalculate();
    }

    /// Folds another cart's lines into this one with `add_item` semantics.
    /// Used when a guest cart is claimed at login.
    pub fn merge(&mut self, other: Cart) -> Result<(), CartError> {
        for item in other.items {
            self.add_item(item)?;
        }
        Ok(())
    }

    /// Promotes a guest cart to a user cart. The session identity is dropped
    /// so exactly one owner remains.
    pub fn set_user(&mut self, user_id: Uuid) {
        self.user_id = Some(user_id);
        self.session_id = None;
        self.touch();
    }

    pub fn extend_expiration(&mut self, days: i64) {
        self.expires_at = Utc::now() + Duration::days(days);
        self.touch();
    }

    fn computed_subtotal(&self) -> Money {
        let total: Decimal = self.items.iter().map(|i| i.line_total().amount()).sum();
        Money::new(total, &self.currency)
    }

    fn recalculate(&mut self) {
        self.subtotal = self.computed_subtotal();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
