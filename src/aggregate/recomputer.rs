//! Aggregate Recomputer
//!
//! Maintains a product's rating with optimistic concurrency control.
//!
//! One attempt is: read the product version, read all its reviews, fold in the
//! pending review change (if any), compute the summary, and commit change and
//! summary together on the condition that the version is still the one read.
//! A version conflict means another commit landed in between, so the whole
//! cycle runs again after a jittered backoff.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{ProductRating, RatingSummary, Review, ReviewMutation};
use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;
use crate::store::{AggregateStore, StoreError};

/// Result of a committed (or skipped) recomputation
#[derive(Debug, Clone)]
pub struct Recomputed {
    /// Rating as stored after the operation
    pub rating: ProductRating,
    /// Review change that was committed with it
    pub mutation: Option<ReviewMutation>,
    /// False when the stored rating was already current and nothing was written
    pub written: bool,
    /// Attempts used, starting at 1
    pub attempts: u32,
}

/// Why a single attempt stopped
#[derive(Debug)]
enum AttemptError {
    Store(StoreError),
    Plan(AppError),
}

impl From<StoreError> for AttemptError {
    fn from(e: StoreError) -> Self {
        AttemptError::Store(e)
    }
}

/// Recomputes product ratings from their reviews
#[derive(Clone)]
pub struct AggregateRecomputer {
    store: Arc<dyn AggregateStore>,
    policy: RetryPolicy,
}

impl AggregateRecomputer {
    pub fn new(store: Arc<dyn AggregateStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn AggregateStore> {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Recompute the rating of `product_id` from its current reviews.
    ///
    /// # Errors
    ///
    /// - `ProductNotFound` if the product does not exist (not retried)
    /// - `VersionConflict` once the retry budget is spent
    /// - `Store` if the store is unreachable (left to the caller to retry)
    pub async fn recompute(&self, product_id: Uuid) -> AppResult<RatingSummary> {
        let recomputed = self.recompute_rating(product_id).await?;
        Ok(recomputed.rating.summary())
    }

    /// Same as `recompute` but returns the stored rating and write details
    pub async fn recompute_rating(&self, product_id: Uuid) -> AppResult<Recomputed> {
        self.commit(product_id, |_, _| Ok(None)).await
    }

    /// Run the optimistic cycle with a review change decided by `plan`.
    ///
    /// `plan` sees the product rating and reviews of the current attempt and
    /// returns the change to commit, `None` for a pure recomputation, or an
    /// error that aborts without retrying.
    pub async fn commit<P>(&self, product_id: Uuid, mut plan: P) -> AppResult<Recomputed>
    where
        P: FnMut(&ProductRating, &[Review]) -> AppResult<Option<ReviewMutation>> + Send,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match self.try_commit(product_id, &mut plan, attempt).await {
                Ok(recomputed) => return Ok(recomputed),
                Err(AttemptError::Plan(e)) => return Err(e),
                Err(AttemptError::Store(e)) => e,
            };

            match error {
                StoreError::ConcurrencyConflict {
                    expected, actual, ..
                } => {
                    if !self.policy.should_retry(attempt) {
                        tracing::error!(
                            product_id = %product_id,
                            attempts = attempt,
                            "Rating recomputation gave up after repeated conflicts"
                        );
                        return Err(AppError::VersionConflict {
                            product_id,
                            attempts: attempt,
                        });
                    }

                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        product_id = %product_id,
                        expected,
                        actual,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Concurrent rating update, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                StoreError::NotFound(id) if id == product_id => {
                    return Err(AppError::ProductNotFound(product_id));
                }
                StoreError::NotFound(id) => return Err(AppError::ReviewNotFound(id)),
                StoreError::DuplicateReview { existing_id } => {
                    return Err(AppError::DuplicateReview { existing_id });
                }
                other => return Err(AppError::Store(other)),
            }
        }
    }

    /// One read-compute-write cycle
    async fn try_commit<P>(
        &self,
        product_id: Uuid,
        plan: &mut P,
        attempt: u32,
    ) -> Result<Recomputed, AttemptError>
    where
        P: FnMut(&ProductRating, &[Review]) -> AppResult<Option<ReviewMutation>> + Send,
    {
        // The version must be read before the reviews it guards
        let parent = self
            .store
            .read_parent(product_id)
            .await?
            .ok_or(StoreError::NotFound(product_id))?;
        let mut reviews = self.store.read_children(product_id).await?;

        let mutation = plan(&parent, &reviews).map_err(AttemptError::Plan)?;
        if let Some(mutation) = &mutation {
            mutation.apply_to(&mut reviews);
        }

        let summary = RatingSummary::from_scores(reviews.iter().map(|r| (r.id, r.score)));

        if mutation.is_none() && parent.matches(&summary) {
            tracing::debug!(
                product_id = %product_id,
                version = parent.version,
                "Rating already current"
            );
            return Ok(Recomputed {
                rating: parent,
                mutation: None,
                written: false,
                attempts: attempt,
            });
        }

        let rating = self
            .store
            .conditional_write_parent(product_id, parent.version, &summary, mutation.as_ref())
            .await?;

        tracing::debug!(
            product_id = %product_id,
            version = rating.version,
            reviews = summary.review_count(),
            mutation = mutation.as_ref().map(ReviewMutation::kind).unwrap_or("none"),
            attempt,
            "Rating committed"
        );

        Ok(Recomputed {
            rating,
            mutation,
            written: true,
            attempts: attempt,
        })
    }
}
