//! Order Handler
//!
//! Prices orders against the catalog and owns their payment state.
//! Prices are frozen on the order when it is priced; later catalog changes
//! never reach an existing order.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Money, OperationContext, Order, OrderLine, PaymentStatus, PaymentTransition, TaxRate,
};
use crate::error::{AppError, AppResult};
use crate::pricing::{DuplicateLinePolicy, OrderTotalCalculator};
use crate::retry::RetryPolicy;
use crate::store::{OrderStore, PriceCatalog, StoreError};

use super::review_handler::DEFAULT_TIMEOUT;
use super::{within_deadline, CreateOrderCommand, UpdateOrderLinesCommand};

/// Handler for order pricing, creation and payment
#[derive(Clone)]
pub struct OrderHandler {
    calculator: OrderTotalCalculator,
    orders: Arc<dyn OrderStore>,
    policy: RetryPolicy,
    default_timeout: Duration,
}

impl OrderHandler {
    pub fn new(
        calculator: OrderTotalCalculator,
        orders: Arc<dyn OrderStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            calculator,
            orders,
            policy,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a handler whose catalog and order storage are the same backend
    pub fn from_store<S>(
        store: Arc<S>,
        tax: TaxRate,
        lines: DuplicateLinePolicy,
        policy: RetryPolicy,
    ) -> Self
    where
        S: PriceCatalog + OrderStore + 'static,
    {
        let calculator = OrderTotalCalculator::new(store.clone(), tax, lines);
        Self::new(calculator, store, policy)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Total of `lines` at current catalog prices, without creating anything.
    ///
    /// # Errors
    ///
    /// - `EmptyOrder` for no lines
    /// - `InvalidLineReference` listing every unknown product
    pub async fn compute_order_total(
        &self,
        lines: &[OrderLine],
        context: &OperationContext,
    ) -> AppResult<Money> {
        within_deadline(
            context,
            self.default_timeout,
            "compute_order_total",
            self.calculator.compute_total(lines),
        )
        .await
    }

    /// Price and persist a new order in one insert.
    pub async fn create_order(
        &self,
        command: CreateOrderCommand,
        context: &OperationContext,
    ) -> AppResult<Order> {
        within_deadline(context, self.default_timeout, "create_order", async {
            let priced = self.calculator.price_lines(&command.lines).await?;
            let now = Utc::now();

            let order = Order {
                id: Uuid::new_v4(),
                user_id: command.user_id,
                lines: priced.lines,
                total: priced.total,
                status: PaymentStatus::from_paid(command.paid),
                version: 0,
                created_at: now,
                updated_at: now,
            };

            let order = self.orders.insert_order(&order).await?;

            tracing::info!(
                order_id = %order.id,
                user_id = %order.user_id,
                lines = order.lines.len(),
                total = %order.total,
                paid = order.is_paid(),
                "Order created"
            );

            Ok(order)
        })
        .await
    }

    /// Replace the lines of an unpaid order, re-pricing them at current prices.
    ///
    /// # Errors
    ///
    /// - `OrderAlreadyPaid` once the order is paid
    /// - `OrderVersionConflict` when concurrent edits exhaust the retry budget
    pub async fn update_order_lines(
        &self,
        command: UpdateOrderLinesCommand,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let order_id = command.order_id;

        within_deadline(context, self.default_timeout, "update_order_lines", async {
            let mut attempt: u32 = 0;

            loop {
                attempt += 1;

                let current = self.find_order(order_id).await?;
                if current.is_paid() {
                    return Err(AppError::OrderAlreadyPaid(order_id));
                }

                let priced = self.calculator.price_lines(&command.lines).await?;

                match self
                    .orders
                    .conditional_write_lines(order_id, current.version, &priced.lines, priced.total)
                    .await
                {
                    Ok(order) => {
                        tracing::info!(
                            order_id = %order_id,
                            version = order.version,
                            total = %order.total,
                            "Order lines updated"
                        );
                        return Ok(order);
                    }
                    Err(StoreError::ConcurrencyConflict { .. }) => {
                        if !self.policy.should_retry(attempt) {
                            return Err(AppError::OrderVersionConflict {
                                order_id,
                                attempts: attempt,
                            });
                        }
                        let delay = self.policy.delay_for(attempt);
                        tracing::warn!(
                            order_id = %order_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Concurrent order update, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(StoreError::NotFound(_)) => return Err(AppError::OrderNotFound(order_id)),
                    Err(e) => return Err(e.into()),
                }
            }
        })
        .await
    }

    /// Set the payment flag of an order.
    ///
    /// Marking a paid order paid again, or an unpaid order unpaid, changes
    /// nothing. Clearing the flag of a paid order fails with `PaymentReversal`.
    pub async fn transition_payment(
        &self,
        order_id: Uuid,
        paid: bool,
        context: &OperationContext,
    ) -> AppResult<Order> {
        within_deadline(context, self.default_timeout, "transition_payment", async {
            let current = self.find_order(order_id).await?;

            match current.status.transition(paid) {
                PaymentTransition::Unchanged => Ok(current),
                PaymentTransition::Reversal => {
                    tracing::warn!(order_id = %order_id, "Rejected payment reversal");
                    Err(AppError::PaymentReversal(order_id))
                }
                PaymentTransition::MarkPaid => {
                    let order = self
                        .orders
                        .mark_paid(order_id)
                        .await?
                        .ok_or(AppError::OrderNotFound(order_id))?;

                    tracing::info!(
                        order_id = %order_id,
                        total = %order.total,
                        "Order paid"
                    );
                    Ok(order)
                }
            }
        })
        .await
    }

    pub async fn get_order(&self, order_id: Uuid) -> AppResult<Order> {
        self.find_order(order_id).await
    }

    async fn find_order(&self, order_id: Uuid) -> AppResult<Order> {
        self.orders
            .find_order(order_id)
            .await?
            .ok_or(AppError::OrderNotFound(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_order_command() {
        let user_id = Uuid::new_v4();
        let line = OrderLine::new(Uuid::new_v4(), 2).unwrap();
        let cmd = CreateOrderCommand::new(user_id, vec![line]).with_payment(true);

        assert_eq!(cmd.user_id, user_id);
        assert_eq!(cmd.lines, vec![line]);
        assert!(cmd.paid);
    }
}
