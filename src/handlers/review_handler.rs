//! Review Coordinator
//!
//! Applies review changes and the resulting product rating as one unit.
//! Each change is folded into the recomputer's optimistic cycle, so it commits
//! together with the rating it produces, or not at all.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::aggregate::AggregateRecomputer;
use crate::domain::{
    OperationContext, ProductRating, Review, ReviewContent, ReviewMutation, Score,
};
use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;
use crate::store::AggregateStore;

use super::{within_deadline, CreateReviewCommand, ReviewResult, UpdateReviewCommand};

/// Default deadline when the caller supplies none
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinates review mutations with product rating recomputation
#[derive(Clone)]
pub struct ReviewCoordinator {
    recomputer: AggregateRecomputer,
    default_timeout: Duration,
}

impl ReviewCoordinator {
    pub fn new(store: Arc<dyn AggregateStore>, policy: RetryPolicy) -> Self {
        Self {
            recomputer: AggregateRecomputer::new(store, policy),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn recomputer(&self) -> &AggregateRecomputer {
        &self.recomputer
    }

    /// Create a review and commit the product's new rating with it.
    ///
    /// # Errors
    ///
    /// - `DuplicateReview` carrying the id of the owner's existing review
    /// - `ProductNotFound` if the product does not exist
    /// - `Domain` for an invalid score or content
    pub async fn create_review(
        &self,
        command: CreateReviewCommand,
        context: &OperationContext,
    ) -> AppResult<ReviewResult> {
        let score = Score::new(command.score)?;
        let content = ReviewContent::new(command.content)?;
        let now = Utc::now();

        let review = Review {
            id: Uuid::new_v4(),
            product_id: command.product_id,
            user_id: command.user_id,
            score,
            content,
            created_at: now,
            updated_at: now,
        };
        let user_id = command.user_id;

        let recomputed = within_deadline(
            context,
            self.default_timeout,
            "create_review",
            self.recomputer.commit(command.product_id, |_, reviews| {
                if let Some(existing) = reviews.iter().find(|r| r.user_id == user_id) {
                    return Err(AppError::DuplicateReview {
                        existing_id: existing.id,
                    });
                }
                Ok(Some(ReviewMutation::Create(review.clone())))
            }),
        )
        .await?;

        tracing::info!(
            review_id = %review.id,
            product_id = %review.product_id,
            version = recomputed.rating.version,
            "Review created"
        );

        Ok(ReviewResult {
            review,
            rating: recomputed.rating,
        })
    }

    /// Change a review's score and/or content and recompute the rating.
    ///
    /// # Errors
    ///
    /// - `ReviewNotFound` if the review does not exist (or was deleted concurrently)
    /// - `InvalidRequest` if neither score nor content is given
    pub async fn update_review(
        &self,
        command: UpdateReviewCommand,
        context: &OperationContext,
    ) -> AppResult<ReviewResult> {
        let review_id = command.review_id;
        let score = command.score.map(Score::new).transpose()?;
        let content = command.content.map(ReviewContent::new).transpose()?;

        if score.is_none() && content.is_none() {
            return Err(AppError::InvalidRequest(
                "Nothing to update: provide a score or content".to_string(),
            ));
        }

        within_deadline(context, self.default_timeout, "update_review", async {
            let existing = self.find_review(review_id).await?;
            let now = Utc::now();

            let recomputed = self
                .recomputer
                .commit(existing.product_id, |_, reviews| {
                    let current = reviews
                        .iter()
                        .find(|r| r.id == review_id)
                        .ok_or(AppError::ReviewNotFound(review_id))?;

                    let mut updated = current.clone();
                    if let Some(score) = score {
                        updated.score = score;
                    }
                    if let Some(content) = &content {
                        updated.content = content.clone();
                    }
                    updated.updated_at = now;

                    Ok(Some(ReviewMutation::Update(updated)))
                })
                .await?;

            let review = match recomputed.mutation {
                Some(ReviewMutation::Update(review)) => review,
                _ => return Err(AppError::ReviewNotFound(review_id)),
            };

            tracing::info!(
                review_id = %review_id,
                product_id = %review.product_id,
                version = recomputed.rating.version,
                "Review updated"
            );

            Ok(ReviewResult {
                review,
                rating: recomputed.rating,
            })
        })
        .await
    }

    /// Delete a review and return the product's recomputed rating.
    pub async fn delete_review(
        &self,
        review_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<ProductRating> {
        within_deadline(context, self.default_timeout, "delete_review", async {
            let existing = self.find_review(review_id).await?;

            let recomputed = self
                .recomputer
                .commit(existing.product_id, |_, reviews| {
                    if !reviews.iter().any(|r| r.id == review_id) {
                        return Err(AppError::ReviewNotFound(review_id));
                    }
                    Ok(Some(ReviewMutation::Delete { review_id }))
                })
                .await?;

            tracing::info!(
                review_id = %review_id,
                product_id = %existing.product_id,
                version = recomputed.rating.version,
                "Review deleted"
            );

            Ok(recomputed.rating)
        })
        .await
    }

    pub async fn get_review(&self, review_id: Uuid) -> AppResult<Review> {
        self.find_review(review_id).await
    }

    /// Current stored rating of a product
    pub async fn get_rating(&self, product_id: Uuid) -> AppResult<ProductRating> {
        self.recomputer
            .store()
            .read_parent(product_id)
            .await?
            .ok_or(AppError::ProductNotFound(product_id))
    }

    async fn find_review(&self, review_id: Uuid) -> AppResult<Review> {
        self.recomputer
            .store()
            .find_review(review_id)
            .await?
            .ok_or(AppError::ReviewNotFound(review_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_review_command() {
        let review_id = Uuid::new_v4();
        let cmd = UpdateReviewCommand::new(review_id)
            .with_score(4)
            .with_content("Better after the update".to_string());

        assert_eq!(cmd.review_id, review_id);
        assert_eq!(cmd.score, Some(4));
        assert_eq!(cmd.content, Some("Better after the update".to_string()));
    }
}
