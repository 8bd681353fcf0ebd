//! Error handling module
//!
//! Centralized error types for the operations exposed to the transport layer.

use uuid::Uuid;

use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Coarse error classes callers map to their own responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced entity absent. Not retried.
    NotFound,
    /// Duplicate or concurrent-write collision
    Conflict,
    /// Malformed or disallowed input. Not retried.
    InvalidInput,
    /// Store or collaborator unreachable. The caller may retry with backoff.
    Unavailable,
    /// Caller-supplied deadline expired
    Timeout,
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Not found
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Review not found: {0}")]
    ReviewNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    // Conflicts
    #[error("Review already exists for this product: {existing_id}")]
    DuplicateReview { existing_id: Uuid },

    #[error("Version conflict on product {product_id} after {attempts} attempts")]
    VersionConflict { product_id: Uuid, attempts: u32 },

    #[error("Version conflict on order {order_id} after {attempts} attempts")]
    OrderVersionConflict { order_id: Uuid, attempts: u32 },

    // Invalid input
    #[error("Order references unknown products: {}", format_ids(.product_ids))]
    InvalidLineReference { product_ids: Vec<Uuid> },

    #[error("Order has no lines")]
    EmptyOrder,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Order {0} is paid and cannot return to unpaid")]
    PaymentReversal(Uuid),

    #[error("Order {0} is paid and its lines can no longer change")]
    OrderAlreadyPaid(Uuid),

    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Unavailable
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ProductNotFound(_)
            | AppError::ReviewNotFound(_)
            | AppError::OrderNotFound(_) => ErrorKind::NotFound,

            AppError::DuplicateReview { .. }
            | AppError::VersionConflict { .. }
            | AppError::OrderVersionConflict { .. } => ErrorKind::Conflict,

            AppError::InvalidLineReference { .. }
            | AppError::EmptyOrder
            | AppError::InvalidRequest(_)
            | AppError::PaymentReversal(_)
            | AppError::OrderAlreadyPaid(_)
            | AppError::Domain(_) => ErrorKind::InvalidInput,

            AppError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            AppError::Store(StoreError::ConcurrencyConflict { .. })
            | AppError::Store(StoreError::DuplicateReview { .. }) => ErrorKind::Conflict,
            AppError::Store(_) | AppError::Config(_) => ErrorKind::Unavailable,

            AppError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Check if the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Unavailable | ErrorKind::Timeout | ErrorKind::Conflict
        ) && !matches!(self, AppError::DuplicateReview { .. })
    }
}
