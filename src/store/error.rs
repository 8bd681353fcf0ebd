//! Store Errors
//!
//! Error types for persistence operations.

use uuid::Uuid;

/// Errors that can occur in a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Row addressed by primary key does not exist
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// The owner already reviewed this product
    #[error("Review already exists for this owner and product: {existing_id}")]
    DuplicateReview { existing_id: Uuid },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data violates a domain rule
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    /// Check if this error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::Database(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_retryable() {
        let conflict = StoreError::ConcurrencyConflict {
            aggregate_id: Uuid::new_v4(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_retryable());
        assert!(conflict.is_concurrency_conflict());

        let not_found = StoreError::NotFound(Uuid::new_v4());
        assert!(!not_found.is_retryable());

        let duplicate = StoreError::DuplicateReview {
            existing_id: Uuid::new_v4(),
        };
        assert!(!duplicate.is_retryable());
        assert!(!duplicate.is_concurrency_conflict());
    }
}
