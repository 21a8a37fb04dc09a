//! Frostline Commerce
//!
//! Self-hosted storefront backend for HVAC and climate equipment.
//!
//! ## Features
//! - Product catalog with variants and a category tree
//! - Shopping cart with guest sessions and login claiming
//! - Orders with a validated status lifecycle and audit log
//! - Totals computation (subtotal, shipping, tax, discount)
//! - Product reviews

pub mod domain;

pub use domain::aggregates::{
    Address, Cart, CartError, Category, CategoryError, CategoryTree, LineItem, Order, OrderError,
    OrderParts, OrderStatus, Product, ProductError, ProductParts, ProductStatus, Review,
    ValidationError, Variant,
};
pub use domain::events::{DomainEvent, OrderEvent};
pub use domain::value_objects::{Money, MoneyError, Quantity, Sku, SkuError};
