//! In-Memory Store Adapter
//!
//! Implements every store port in process. Useful for testing and development.
//! Conditional writes take the write lock, check the version and apply
//! the change before releasing it, so they are atomic with respect to each other.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Money, Order, PaymentStatus, PricedLine, ProductRating, RatingSummary, Review, ReviewMutation,
};

use super::{AggregateStore, OrderStore, PriceCatalog, StoreError};

#[derive(Debug, Clone)]
struct ProductRow {
    price: Money,
    rating: ProductRating,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<Uuid, ProductRow>,
    reviews: HashMap<Uuid, Review>,
    orders: HashMap<Uuid, Order>,
}

/// In-memory storage for products, reviews and orders
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product with a unit price and return its id
    pub async fn add_product(&self, price: Money) -> Uuid {
        let product_id = Uuid::new_v4();
        self.insert_product(product_id, price).await;
        product_id
    }

    pub async fn insert_product(&self, product_id: Uuid, price: Money) {
        let mut state = self.state.write().await;
        state.products.insert(
            product_id,
            ProductRow {
                price,
                rating: ProductRating::new(product_id),
            },
        );
    }

    /// Change the catalog price of a product
    pub async fn set_price(&self, product_id: Uuid, price: Money) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let row = state
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::NotFound(product_id))?;
        row.price = price;
        Ok(())
    }

    /// Insert a review without touching the product rating.
    ///
    /// Simulates a write that bypassed the coordinator.
    pub async fn insert_review_unchecked(&self, review: Review) {
        self.state.write().await.reviews.insert(review.id, review);
    }

    pub async fn review_count(&self) -> usize {
        self.state.read().await.reviews.len()
    }
}

#[async_trait]
impl AggregateStore for InMemoryStore {
    async fn read_parent(&self, product_id: Uuid) -> Result<Option<ProductRating>, StoreError> {
        let state = self.state.read().await;
        Ok(state.products.get(&product_id).map(|row| row.rating.clone()))
    }

    async fn read_children(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn find_review(&self, review_id: Uuid) -> Result<Option<Review>, StoreError> {
        let state = self.state.read().await;
        Ok(state.reviews.get(&review_id).cloned())
    }

    async fn find_review_by_owner(
        &self,
        product_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Review>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .values()
            .find(|r| r.product_id == product_id && r.user_id == user_id)
            .cloned())
    }

    async fn conditional_write_parent(
        &self,
        product_id: Uuid,
        expected_version: i64,
        summary: &RatingSummary,
        mutation: Option<&ReviewMutation>,
    ) -> Result<ProductRating, StoreError> {
        let mut state = self.state.write().await;

        let actual = state
            .products
            .get(&product_id)
            .map(|row| row.rating.version)
            .ok_or(StoreError::NotFound(product_id))?;

        if actual != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: product_id,
                expected: expected_version,
                actual,
            });
        }

        // Validate the review change before mutating anything
        match mutation {
            Some(ReviewMutation::Create(review)) => {
                if let Some(existing) = state
                    .reviews
                    .values()
                    .find(|r| r.product_id == review.product_id && r.user_id == review.user_id)
                {
                    return Err(StoreError::DuplicateReview {
                        existing_id: existing.id,
                    });
                }
            }
            Some(ReviewMutation::Update(review)) => {
                if !state.reviews.contains_key(&review.id) {
                    return Err(StoreError::NotFound(review.id));
                }
            }
            Some(ReviewMutation::Delete { review_id }) => {
                if !state.reviews.contains_key(review_id) {
                    return Err(StoreError::NotFound(*review_id));
                }
            }
            None => {}
        }

        match mutation {
            Some(ReviewMutation::Create(review)) | Some(ReviewMutation::Update(review)) => {
                state.reviews.insert(review.id, review.clone());
            }
            Some(ReviewMutation::Delete { review_id }) => {
                state.reviews.remove(review_id);
            }
            None => {}
        }

        let row = state
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::NotFound(product_id))?;
        row.rating.average_score = summary.average_score;
        row.rating.review_ids = summary.review_ids.clone();
        row.rating.version += 1;
        row.rating.updated_at = Utc::now();

        Ok(row.rating.clone())
    }

    async fn list_product_ids(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.read().await;
        let mut ids: Vec<Uuid> = state
            .products
            .keys()
            .copied()
            .filter(|id| after.map_or(true, |after| *id > after))
            .collect();
        ids.sort();
        ids.truncate(limit.max(0) as usize);
        Ok(ids)
    }
}

#[async_trait]
impl PriceCatalog for InMemoryStore {
    async fn bulk_get_prices(
        &self,
        product_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Money>, StoreError> {
        let state = self.state.read().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|row| (*id, row.price)))
            .collect())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<Order, StoreError> {
        let mut state = self.state.write().await;
        state.orders.insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn mark_paid(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(None);
        };

        if !order.is_paid() {
            order.status = PaymentStatus::Paid;
            order.version += 1;
            order.updated_at = Utc::now();
        }

        Ok(Some(order.clone()))
    }

    async fn conditional_write_lines(
        &self,
        order_id: Uuid,
        expected_version: i64,
        lines: &[PricedLine],
        total: Money,
    ) -> Result<Order, StoreError> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound(order_id))?;

        if order.version != expected_version || order.is_paid() {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: order_id,
                expected: expected_version,
                actual: order.version,
            });
        }

        order.lines = lines.to_vec();
        order.total = total;
        order.version += 1;
        order.updated_at = Utc::now();

        Ok(order.clone())
    }
}
