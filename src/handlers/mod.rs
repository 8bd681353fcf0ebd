//! Command Handlers module
//!
//! Handlers orchestrate operations over the store ports: review changes with
//! their product rating, and order pricing with payment. Every operation runs
//! under a deadline taken from the caller's context or the configured default.

mod commands;
mod order_handler;
mod review_handler;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::domain::OperationContext;
use crate::error::{AppError, AppResult};
use crate::pricing::OrderTotalCalculator;
use crate::store::{AggregateStore, OrderStore, PriceCatalog};

pub use commands::*;
pub use order_handler::OrderHandler;
pub use review_handler::{ReviewCoordinator, DEFAULT_TIMEOUT};

/// Both handlers wired to one storage backend
#[derive(Clone)]
pub struct Services {
    pub reviews: ReviewCoordinator,
    pub orders: OrderHandler,
}

impl Services {
    pub fn new<S>(store: Arc<S>, config: &Config) -> Self
    where
        S: AggregateStore + PriceCatalog + OrderStore + 'static,
    {
        let policy = config.retry_policy();
        let calculator = OrderTotalCalculator::new(
            store.clone(),
            config.tax_rate,
            config.duplicate_line_policy(),
        );

        Self {
            reviews: ReviewCoordinator::new(store.clone(), policy.clone())
                .with_timeout(config.operation_timeout),
            orders: OrderHandler::new(calculator, store, policy)
                .with_timeout(config.operation_timeout),
        }
    }
}

/// Run `operation` under the context's deadline, or `default` if it has none.
///
/// An expired deadline drops the operation future. Commits are single
/// conditional writes, so a dropped operation has either committed fully or
/// left nothing behind.
pub(crate) async fn within_deadline<T, F>(
    context: &OperationContext,
    default: Duration,
    operation: &'static str,
    future: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    let deadline = context.deadline_or(default);

    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                deadline_ms = deadline.as_millis() as u64,
                correlation_id = ?context.correlation_id,
                "Operation deadline expired"
            );
            Err(AppError::Timeout(deadline))
        }
    }
}
