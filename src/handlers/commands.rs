//! Command definitions
//!
//! Commands represent intentions to change the system state.
//! Field values arrive unvalidated and are checked by the handlers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{OrderLine, ProductRating, Review};

// =========================================================================
// Reviews
// =========================================================================

/// Command to review a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewCommand {
    pub product_id: Uuid,
    /// Owner of the review; one review per owner and product
    pub user_id: Uuid,
    pub score: i64,
    pub content: String,
}

impl CreateReviewCommand {
    pub fn new(product_id: Uuid, user_id: Uuid, score: i64, content: String) -> Self {
        Self {
            product_id,
            user_id,
            score,
            content,
        }
    }
}

/// Command to change a review's score and/or content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReviewCommand {
    pub review_id: Uuid,
    pub score: Option<i64>,
    pub content: Option<String>,
}

impl UpdateReviewCommand {
    pub fn new(review_id: Uuid) -> Self {
        Self {
            review_id,
            score: None,
            content: None,
        }
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }
}

/// A review together with the product rating committed alongside it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub review: Review,
    pub rating: ProductRating,
}

// =========================================================================
// Orders
// =========================================================================

/// Command to place an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderCommand {
    pub user_id: Uuid,
    pub lines: Vec<OrderLine>,
    /// Initial payment flag
    #[serde(default)]
    pub paid: bool,
}

impl CreateOrderCommand {
    pub fn new(user_id: Uuid, lines: Vec<OrderLine>) -> Self {
        Self {
            user_id,
            lines,
            paid: false,
        }
    }

    pub fn with_payment(mut self, paid: bool) -> Self {
        self.paid = paid;
        self
    }
}

/// Command to re-price an unpaid order with a new set of lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderLinesCommand {
    pub order_id: Uuid,
    pub lines: Vec<OrderLine>,
}

impl UpdateOrderLinesCommand {
    pub fn new(order_id: Uuid, lines: Vec<OrderLine>) -> Self {
        Self { order_id, lines }
    }
}
