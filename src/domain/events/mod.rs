//! Domain events.
//!
//! Two flavors live here: [`OrderEvent`], the append-only audit record an
//! order keeps for itself, and [`DomainEvent`], the integration events
//! aggregates raise for the outside world (drained with `take_events` and
//! published by the service when NATS is configured).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::status::OrderStatus;

/// One entry in an order's audit log: the status the order entered plus an
/// optional human-facing description and internal notes.
#[derive(Clone, Debug, Serialize)]
pub struct OrderEvent {
    status: OrderStatus,
    description: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(status: OrderStatus, description: Option<String>, notes: Option<String>) -> Self {
        Self { status, description, notes, created_at: Utc::now() }
    }

    pub fn from_parts(
        status: OrderStatus,
        description: Option<String>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { status, description, notes, created_at }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Integration events, serialized as JSON onto the message bus.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        customer_email: String,
        total: Decimal,
        currency: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        order_number: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderPaymentRecorded {
        order_id: Uuid,
        order_number: String,
        payment_intent_id: String,
        payment_method: String,
    },
    ProductStockAdjusted {
        product_id: Uuid,
        sku: String,
        stock: u32,
    },
}
