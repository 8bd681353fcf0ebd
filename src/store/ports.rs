//! Store ports
//!
//! Contracts between the core and its durable storage. `PgStore` implements
//! them on PostgreSQL, `InMemoryStore` in process.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{Money, Order, PricedLine, ProductRating, RatingSummary, Review, ReviewMutation};

use super::StoreError;

/// Storage for product ratings (parent) and reviews (children).
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Read the rating fields and version of a product.
    ///
    /// Returns `None` if the product does not exist.
    async fn read_parent(&self, product_id: Uuid) -> Result<Option<ProductRating>, StoreError>;

    /// Read every review currently attached to a product.
    async fn read_children(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError>;

    async fn find_review(&self, review_id: Uuid) -> Result<Option<Review>, StoreError>;

    /// Find the review an owner left on a product, if any.
    async fn find_review_by_owner(
        &self,
        product_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Review>, StoreError>;

    /// Commit `summary` (and `mutation`, if any) only if the product is still at
    /// `expected_version`. Both are applied or neither is.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if another commit advanced the version
    /// - `NotFound` if the product (or the updated/deleted review) is gone
    /// - `DuplicateReview` if a created review collides with the owner's existing one
    async fn conditional_write_parent(
        &self,
        product_id: Uuid,
        expected_version: i64,
        summary: &RatingSummary,
        mutation: Option<&ReviewMutation>,
    ) -> Result<ProductRating, StoreError>;

    /// Page through product ids in ascending order.
    async fn list_product_ids(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;
}

/// Authoritative source of current unit prices.
#[async_trait]
pub trait PriceCatalog: Send + Sync {
    /// Look up the prices of all `product_ids` in one round trip.
    ///
    /// Unknown ids are simply absent from the result.
    async fn bulk_get_prices(
        &self,
        product_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Money>, StoreError>;
}

/// Storage for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a fully priced order in a single statement.
    async fn insert_order(&self, order: &Order) -> Result<Order, StoreError>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Set the payment flag. Already-paid orders are returned unchanged.
    ///
    /// Returns `None` if the order does not exist.
    async fn mark_paid(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Replace lines and total if the order is unpaid and still at `expected_version`.
    async fn conditional_write_lines(
        &self,
        order_id: Uuid,
        expected_version: i64,
        lines: &[PricedLine],
        total: Money,
    ) -> Result<Order, StoreError>;
}
