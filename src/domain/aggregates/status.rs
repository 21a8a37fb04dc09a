//! Order status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of an order.
///
/// ```text
/// Pending ──► Paid ──► Processing ──► Shipped ──► Delivered
///    │          │           │            │            │
///    │          │           │            └──► Returned◄┘
///    │          │           │                     │
///    └──────────┴───────────┴──► Cancelled        │
///               └───────────┴───────────► Refunded◄
/// ```
///
/// `Cancelled` and `Refunded` are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    Returned,
}

impl OrderStatus {
    /// The set of states this state may legally move to next.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Paid, Cancelled],
            Paid => &[Processing, Refunded, Cancelled],
            Processing => &[Shipped, Refunded, Cancelled],
            Shipped => &[Delivered, Returned],
            Delivered => &[Returned],
            Cancelled => &[],
            Refunded => &[],
            Returned => &[Refunded],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Returned => "returned",
        }
    }

    /// Parses the stored form produced by [`OrderStatus::as_str`].
    pub fn parse(value: &str) -> Option<OrderStatus> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            "returned" => Some(OrderStatus::Returned),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    #[test]
    fn default_is_pending() {
        assert_eq!(OrderStatus::default(), Pending);
    }

    #[test]
    fn pending_moves_to_paid_or_cancelled_only() {
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Pending.can_transition_to(Returned));
    }

    #[test]
    fn paid_and_processing_can_refund_or_cancel() {
        assert!(Paid.can_transition_to(Processing));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Paid.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Processing.can_transition_to(Refunded));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn shipped_and_delivered_can_be_returned() {
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Shipped.can_transition_to(Returned));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(Delivered.can_transition_to(Returned));
        assert!(!Delivered.can_transition_to(Refunded));
    }

    #[test]
    fn returned_can_only_be_refunded() {
        assert_eq!(Returned.allowed_transitions(), &[Refunded][..]);
    }

    #[test]
    fn cancelled_and_refunded_are_terminal() {
        for next in [Pending, Paid, Processing, Shipped, Delivered, Cancelled, Refunded, Returned] {
            assert!(!Cancelled.can_transition_to(next));
            assert!(!Refunded.can_transition_to(next));
        }
        assert!(Cancelled.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(!Pending.is_terminal());
    }

    #[test]
    fn stored_form_round_trips() {
        for status in [Pending, Paid, Processing, Shipped, Delivered, Cancelled, Refunded, Returned]
        {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
    }
}
