//! Operation Context
//!
//! Contains metadata about the current operation for tracing and deadlines.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Context for an operation, used for tracing and cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// User ID of the caller, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_user_id: Option<Uuid>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Time budget for the whole operation
    #[serde(skip)]
    pub deadline: Option<Duration>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            request_user_id: None,
            correlation_id: None,
            deadline: None,
        }
    }

    /// Create context with request user ID
    pub fn with_request_user(mut self, user_id: Uuid) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with a deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    /// Deadline to enforce, falling back to `default` when the caller gave none
    pub fn deadline_or(&self, default: Duration) -> Duration {
        self.deadline.unwrap_or(default)
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
