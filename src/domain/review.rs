//! Review (child record) and product rating (parent aggregate fields)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{DomainError, RatingSummary, Score};

/// Minimum review content length, in characters
pub const MIN_CONTENT_LEN: usize = 3;

/// Free-text body of a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReviewContent(String);

impl ReviewContent {
    pub fn new(content: impl Into<String>) -> Result<Self, DomainError> {
        let content = content.into();
        if content.trim().chars().count() < MIN_CONTENT_LEN {
            return Err(DomainError::ContentTooShort {
                min: MIN_CONTENT_LEN,
            });
        }
        Ok(Self(content))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ReviewContent {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ReviewContent::new(value)
    }
}

impl From<ReviewContent> for String {
    fn from(content: ReviewContent) -> Self {
        content.0
    }
}

/// A persisted review.
///
/// `product_id` and `user_id` never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub score: Score,
    pub content: ReviewContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rating fields of a product row.
///
/// Only the aggregate recomputer writes these. `version` increases by one on
/// every committed change and is the optimistic concurrency marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRating {
    pub product_id: Uuid,
    pub average_score: Option<Decimal>,
    pub review_ids: BTreeSet<Uuid>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl ProductRating {
    /// Rating of a freshly created product: no reviews, version 0
    pub fn new(product_id: Uuid) -> Self {
        Self {
            product_id,
            average_score: None,
            review_ids: BTreeSet::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> RatingSummary {
        RatingSummary {
            average_score: self.average_score,
            review_ids: self.review_ids.clone(),
        }
    }

    /// Whether the stored fields already equal `summary`
    pub fn matches(&self, summary: &RatingSummary) -> bool {
        self.average_score == summary.average_score && self.review_ids == summary.review_ids
    }
}

/// A pending change to one review, committed together with the product rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewMutation {
    Create(Review),
    Update(Review),
    Delete { review_id: Uuid },
}

impl ReviewMutation {
    /// Apply the mutation to a snapshot of a product's reviews
    pub fn apply_to(&self, reviews: &mut Vec<Review>) {
        match self {
            ReviewMutation::Create(review) => reviews.push(review.clone()),
            ReviewMutation::Update(review) => {
                if let Some(existing) = reviews.iter_mut().find(|r| r.id == review.id) {
                    *existing = review.clone();
                }
            }
            ReviewMutation::Delete { review_id } => reviews.retain(|r| r.id != *review_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReviewMutation::Create(_) => "create",
            ReviewMutation::Update(_) => "update",
            ReviewMutation::Delete { .. } => "delete",
        }
    }
}
