//! Product reviews.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::line_item::ValidationError;

/// A customer review of a product. Rating is a 1..=5 star value; anything
/// outside that range is rejected at construction.
#[derive(Clone, Debug, Serialize)]
pub struct Review {
    id: Uuid,
    product_id: Uuid,
    user_id: Option<Uuid>,
    author_name: String,
    rating: u8,
    title: Option<String>,
    body: String,
    verified_purchase: bool,
    created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        product_id: Uuid,
        user_id: Option<Uuid>,
        author_name: impl Into<String>,
        rating: u8,
        title: Option<String>,
        body: impl Into<String>,
        verified_purchase: bool,
    ) -> Result<Self, ValidationError> {
        let author_name = author_name.into();
        let body = body.into();
        if author_name.trim().is_empty() {
            return Err(ValidationError::new("author_name", "must not be empty"));
        }
        if !(1..=5).contains(&rating) {
            return Err(ValidationError::new(
                "rating",
                format!("must be between 1 and 5, got {rating}"),
            ));
        }
        if body.trim().is_empty() {
            return Err(ValidationError::new("body", "must not be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            product_id,
            user_id,
            author_name,
            rating,
            title,
            body,
            verified_purchase,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn product_id(&self) -> Uuid {
        self.product_id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn verified_purchase(&self) -> bool {
        self.verified_purchase
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
