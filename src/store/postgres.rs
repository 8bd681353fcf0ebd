//! PostgreSQL Store Adapter
//!
//! Implements the store ports on a shared `PgPool`. The pool is injected;
//! this module never opens connections itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    Money, Order, PaymentStatus, PricedLine, ProductRating, RatingSummary, Review, ReviewContent,
    ReviewMutation, Score,
};

use super::{AggregateStore, OrderStore, PriceCatalog, StoreError};

/// Store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    score: i16,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        Ok(Review {
            id: row.id,
            product_id: row.product_id,
            user_id: row.user_id,
            score: Score::new(row.score as i64)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            content: ReviewContent::new(row.content)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    lines: Json<Vec<PricedLine>>,
    total: Decimal,
    paid: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            lines: row.lines.0,
            total: Money::new(row.total).map_err(|e| StoreError::InvalidData(e.to_string()))?,
            status: PaymentStatus::from_paid(row.paid),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const REVIEW_COLUMNS: &str =
    "id, product_id, user_id, score, content, created_at, updated_at";

const ORDER_COLUMNS: &str =
    "id, user_id, lines, total, paid, version, created_at, updated_at";

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply a review change inside the rating transaction
    async fn apply_mutation(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
        mutation: &ReviewMutation,
    ) -> Result<(), StoreError> {
        match mutation {
            ReviewMutation::Create(review) => {
                sqlx::query(
                    r#"
                    INSERT INTO reviews (id, product_id, user_id, score, content, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(review.id)
                .bind(review.product_id)
                .bind(review.user_id)
                .bind(review.score.value() as i16)
                .bind(review.content.as_str())
                .bind(review.created_at)
                .bind(review.updated_at)
                .execute(&mut **tx)
                .await?;
            }
            ReviewMutation::Update(review) => {
                let rows_affected = sqlx::query(
                    r#"
                    UPDATE reviews
                    SET score = $3, content = $4, updated_at = $5
                    WHERE id = $1 AND product_id = $2
                    "#,
                )
                .bind(review.id)
                .bind(product_id)
                .bind(review.score.value() as i16)
                .bind(review.content.as_str())
                .bind(review.updated_at)
                .execute(&mut **tx)
                .await?
                .rows_affected();

                if rows_affected == 0 {
                    return Err(StoreError::NotFound(review.id));
                }
            }
            ReviewMutation::Delete { review_id } => {
                let rows_affected =
                    sqlx::query("DELETE FROM reviews WHERE id = $1 AND product_id = $2")
                        .bind(review_id)
                        .bind(product_id)
                        .execute(&mut **tx)
                        .await?
                        .rows_affected();

                if rows_affected == 0 {
                    return Err(StoreError::NotFound(*review_id));
                }
            }
        }

        Ok(())
    }

    async fn try_conditional_write_parent(
        &self,
        product_id: Uuid,
        expected_version: i64,
        summary: &RatingSummary,
        mutation: Option<&ReviewMutation>,
    ) -> Result<ProductRating, StoreError> {
        let mut tx = self.pool.begin().await?;
        let review_ids: Vec<Uuid> = summary.review_ids.iter().copied().collect();

        // Version check and row lock in one statement
        let updated: Option<(Option<Decimal>, Vec<Uuid>, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            UPDATE products
            SET average_score = $3,
                review_ids = $4,
                rating_version = rating_version + 1,
                updated_at = NOW()
            WHERE id = $1 AND rating_version = $2
            RETURNING average_score, review_ids, rating_version, updated_at
            "#,
        )
        .bind(product_id)
        .bind(expected_version)
        .bind(summary.average_score)
        .bind(&review_ids)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((average_score, review_ids, version, updated_at)) = updated else {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT rating_version FROM products WHERE id = $1")
                    .bind(product_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    aggregate_id: product_id,
                    expected: expected_version,
                    actual,
                },
                None => StoreError::NotFound(product_id),
            });
        };

        if let Some(mutation) = mutation {
            self.apply_mutation(&mut tx, product_id, mutation).await?;
        }

        tx.commit().await?;

        Ok(ProductRating {
            product_id,
            average_score,
            review_ids: review_ids.into_iter().collect(),
            version,
            updated_at,
        })
    }
}

#[async_trait]
impl AggregateStore for PgStore {
    async fn read_parent(&self, product_id: Uuid) -> Result<Option<ProductRating>, StoreError> {
        let row: Option<(Option<Decimal>, Vec<Uuid>, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT average_score, review_ids, rating_version, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(average_score, review_ids, version, updated_at)| ProductRating {
            product_id,
            average_score,
            review_ids: review_ids.into_iter().collect(),
            version,
            updated_at,
        }))
    }

    async fn read_children(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE product_id = $1");
        let rows: Vec<ReviewRow> = sqlx::query_as(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Review::try_from).collect()
    }

    async fn find_review(&self, review_id: Uuid) -> Result<Option<Review>, StoreError> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        let row: Option<ReviewRow> = sqlx::query_as(&sql)
            .bind(review_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Review::try_from).transpose()
    }

    async fn find_review_by_owner(
        &self,
        product_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Review>, StoreError> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE product_id = $1 AND user_id = $2"
        );
        let row: Option<ReviewRow> = sqlx::query_as(&sql)
            .bind(product_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Review::try_from).transpose()
    }

    async fn conditional_write_parent(
        &self,
        product_id: Uuid,
        expected_version: i64,
        summary: &RatingSummary,
        mutation: Option<&ReviewMutation>,
    ) -> Result<ProductRating, StoreError> {
        match self
            .try_conditional_write_parent(product_id, expected_version, summary, mutation)
            .await
        {
            Err(StoreError::Database(sqlx::Error::Database(db_err)))
                if db_err.is_unique_violation() =>
            {
                // The transaction was rolled back; resolve the review that won
                let Some(ReviewMutation::Create(review)) = mutation else {
                    return Err(StoreError::Database(sqlx::Error::Database(db_err)));
                };
                let existing = self
                    .find_review_by_owner(review.product_id, review.user_id)
                    .await?
                    .ok_or_else(|| StoreError::Database(sqlx::Error::Database(db_err)))?;

                Err(StoreError::DuplicateReview {
                    existing_id: existing.id,
                })
            }
            other => other,
        }
    }

    async fn list_product_ids(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM products
            WHERE $1::uuid IS NULL OR id > $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl PriceCatalog for PgStore {
    async fn bulk_get_prices(
        &self,
        product_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Money>, StoreError> {
        let rows: Vec<(Uuid, Decimal)> =
            sqlx::query_as("SELECT id, price FROM products WHERE id = ANY($1)")
                .bind(product_ids)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(id, price)| {
                Money::new(price)
                    .map(|price| (id, price))
                    .map_err(|e| StoreError::InvalidData(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<Order, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO orders (id, user_id, lines, total, paid, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row: OrderRow = sqlx::query_as(&sql)
            .bind(order.id)
            .bind(order.user_id)
            .bind(Json(&order.lines))
            .bind(order.total.value())
            .bind(order.is_paid())
            .bind(order.version)
            .bind(order.created_at)
            .bind(order.updated_at)
            .fetch_one(&self.pool)
            .await?;

        Order::try_from(row)
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    async fn mark_paid(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let sql = format!(
            r#"
            UPDATE orders
            SET paid = TRUE, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND paid = FALSE
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Order::try_from(row).map(Some),
            // Either already paid or missing
            None => self.find_order(order_id).await,
        }
    }

    async fn conditional_write_lines(
        &self,
        order_id: Uuid,
        expected_version: i64,
        lines: &[PricedLine],
        total: Money,
    ) -> Result<Order, StoreError> {
        let sql = format!(
            r#"
            UPDATE orders
            SET lines = $3, total = $4, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2 AND paid = FALSE
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .bind(expected_version)
            .bind(Json(lines))
            .bind(total.value())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Order::try_from(row),
            None => {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                        .bind(order_id)
                        .fetch_optional(&self.pool)
                        .await?;

                Err(match actual {
                    Some(actual) => StoreError::ConcurrencyConflict {
                        aggregate_id: order_id,
                        expected: expected_version,
                        actual,
                    },
                    None => StoreError::NotFound(order_id),
                })
            }
        }
    }
}
