//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Domain-specific validation errors
///
/// These errors represent invalid values and violated domain rules.
/// They are independent of the storage layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Review score outside the accepted range
    #[error("Invalid score: {0} (must be between 1 and 5)")]
    InvalidScore(i64),

    /// Review content too short
    #[error("Invalid review content: must contain at least {min} characters")]
    ContentTooShort { min: usize },

    /// Order line quantity below one
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity {
        product_id: uuid::Uuid,
        quantity: i64,
    },

    /// Negative monetary amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Negative tax rate
    #[error("Invalid tax rate: {0}")]
    InvalidTaxRate(String),
}

impl DomainError {
    /// Create an invalid quantity error
    pub fn invalid_quantity(product_id: uuid::Uuid, quantity: i64) -> Self {
        Self::InvalidQuantity {
            product_id,
            quantity,
        }
    }
}
