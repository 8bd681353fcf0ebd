//! Handler tests against the in-memory store
//!
//! Concurrency tests run on a multi-threaded runtime so that competing
//! operations really interleave between read and conditional write.

#[cfg(test)]
mod tests {
    use crate::domain::{
        Money, OperationContext, OrderLine, ProductRating, RatingSummary, Review, ReviewMutation,
        TaxRate,
    };
    use crate::error::{AppError, ErrorKind};
    use crate::handlers::{
        CreateOrderCommand, CreateReviewCommand, OrderHandler, ReviewCoordinator,
        UpdateOrderLinesCommand, UpdateReviewCommand,
    };
    use crate::pricing::DuplicateLinePolicy;
    use crate::retry::RetryPolicy;
    use crate::store::{AggregateStore, InMemoryStore, StoreError};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn money(value: Decimal) -> Money {
        Money::new(value).unwrap()
    }

    fn generous_policy() -> RetryPolicy {
        RetryPolicy::new(64, Duration::from_millis(1), Duration::from_millis(10))
    }

    async fn review_setup() -> (Arc<InMemoryStore>, ReviewCoordinator, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let product_id = store.add_product(money(dec!(10.00))).await;
        let coordinator = ReviewCoordinator::new(store.clone(), generous_policy());
        (store, coordinator, product_id)
    }

    fn order_handler(store: &Arc<InMemoryStore>) -> OrderHandler {
        OrderHandler::from_store(
            store.clone(),
            TaxRate::default(),
            DuplicateLinePolicy::Merge,
            generous_policy(),
        )
    }

    fn create(product_id: Uuid, score: i64) -> CreateReviewCommand {
        CreateReviewCommand::new(product_id, Uuid::new_v4(), score, "Solid product".to_string())
    }

    /// Stored rating must equal the rating recomputed from the stored reviews
    async fn assert_converged(store: &InMemoryStore, product_id: Uuid) -> RatingSummary {
        let rating = store.read_parent(product_id).await.unwrap().unwrap();
        let reviews = store.read_children(product_id).await.unwrap();
        let expected = RatingSummary::from_scores(reviews.iter().map(|r| (r.id, r.score)));

        assert_eq!(rating.summary(), expected);
        expected
    }

    // =========================================================================
    // Reviews
    // =========================================================================

    #[tokio::test]
    async fn test_create_review_updates_rating() {
        let (store, coordinator, product_id) = review_setup().await;
        let context = OperationContext::new();

        let first = coordinator.create_review(create(product_id, 5), &context).await.unwrap();
        assert_eq!(first.rating.average_score, Some(dec!(5)));
        assert_eq!(first.rating.version, 1);

        let second = coordinator.create_review(create(product_id, 2), &context).await.unwrap();
        assert_eq!(second.rating.average_score, Some(dec!(3.5)));
        assert_eq!(second.rating.review_ids.len(), 2);
        assert!(second.rating.review_ids.contains(&first.review.id));
        assert!(second.rating.review_ids.contains(&second.review.id));

        assert_converged(&store, product_id).await;
    }

    #[tokio::test]
    async fn test_duplicate_review_rejected() {
        let (store, coordinator, product_id) = review_setup().await;
        let context = OperationContext::new();
        let user_id = Uuid::new_v4();

        let first = coordinator
            .create_review(
                CreateReviewCommand::new(product_id, user_id, 4, "First take".to_string()),
                &context,
            )
            .await
            .unwrap();

        let result = coordinator
            .create_review(
                CreateReviewCommand::new(product_id, user_id, 1, "Second take".to_string()),
                &context,
            )
            .await;

        match result {
            Err(AppError::DuplicateReview { existing_id }) => {
                assert_eq!(existing_id, first.review.id);
            }
            other => panic!("Expected DuplicateReview, got: {:?}", other),
        }

        let rating = coordinator.get_rating(product_id).await.unwrap();
        assert_eq!(rating.average_score, Some(dec!(4)));
        assert_eq!(rating.version, 1);
        assert_eq!(store.review_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_review_validation() {
        let (store, coordinator, product_id) = review_setup().await;
        let context = OperationContext::new();

        let result = coordinator.create_review(create(product_id, 6), &context).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);

        let short = CreateReviewCommand::new(product_id, Uuid::new_v4(), 3, "ok".to_string());
        let result = coordinator.create_review(short, &context).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);

        let result = coordinator.create_review(create(Uuid::new_v4(), 3), &context).await;
        assert!(matches!(result, Err(AppError::ProductNotFound(_))));

        assert_eq!(store.review_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete_review() {
        let (store, coordinator, product_id) = review_setup().await;
        let context = OperationContext::new();

        let a = coordinator.create_review(create(product_id, 1), &context).await.unwrap();
        coordinator.create_review(create(product_id, 3), &context).await.unwrap();

        let updated = coordinator
            .update_review(UpdateReviewCommand::new(a.review.id).with_score(5), &context)
            .await
            .unwrap();
        assert_eq!(updated.review.score.value(), 5);
        assert_eq!(updated.review.content, a.review.content);
        assert_eq!(updated.rating.average_score, Some(dec!(4)));

        let rating = coordinator.delete_review(a.review.id, &context).await.unwrap();
        assert_eq!(rating.average_score, Some(dec!(3)));
        assert_eq!(rating.review_ids.len(), 1);

        let result = coordinator.get_review(a.review.id).await;
        assert!(matches!(result, Err(AppError::ReviewNotFound(_))));

        assert_converged(&store, product_id).await;
    }

    #[tokio::test]
    async fn test_delete_last_review_clears_rating() {
        let (store, coordinator, product_id) = review_setup().await;
        let context = OperationContext::new();

        let only = coordinator.create_review(create(product_id, 4), &context).await.unwrap();
        let rating = coordinator.delete_review(only.review.id, &context).await.unwrap();

        assert_eq!(rating.average_score, None);
        assert!(rating.review_ids.is_empty());
        assert_converged(&store, product_id).await;
    }

    #[tokio::test]
    async fn test_update_review_requires_a_change() {
        let (_store, coordinator, product_id) = review_setup().await;
        let context = OperationContext::new();
        let created = coordinator.create_review(create(product_id, 4), &context).await.unwrap();

        let result = coordinator
            .update_review(UpdateReviewCommand::new(created.review.id), &context)
            .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));

        let result = coordinator
            .update_review(UpdateReviewCommand::new(Uuid::new_v4()).with_score(2), &context)
            .await;
        assert!(matches!(result, Err(AppError::ReviewNotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_lose_no_updates() {
        let (store, coordinator, product_id) = review_setup().await;
        let count = 24;

        let mut tasks = Vec::with_capacity(count);
        for i in 0..count {
            let coordinator = coordinator.clone();
            let score = (i % 5) as i64 + 1;
            tasks.push(tokio::spawn(async move {
                coordinator
                    .create_review(create(product_id, score), &OperationContext::new())
                    .await
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let summary = assert_converged(&store, product_id).await;
        assert_eq!(summary.review_count(), count);
        // Scores 1..=5 repeated evenly (24 = 4 full rounds + 1,2,3,4)
        let expected = Decimal::from(4 * 15 + 10) / Decimal::from(count as u32);
        assert_eq!(summary.average_score, Some(expected.round_dp(4)));

        let rating = store.read_parent(product_id).await.unwrap().unwrap();
        assert_eq!(rating.version, count as i64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mixed_mutations_converge() {
        let (store, coordinator, product_id) = review_setup().await;
        let context = OperationContext::new();

        let mut seeded = Vec::new();
        for score in [1, 2, 3, 4, 5, 5] {
            seeded.push(coordinator.create_review(create(product_id, score), &context).await.unwrap());
        }

        let mut tasks = Vec::new();
        for (i, result) in seeded.into_iter().enumerate() {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                let context = OperationContext::new();
                if i % 2 == 0 {
                    coordinator.delete_review(result.review.id, &context).await.map(|_| ())
                } else {
                    coordinator
                        .update_review(UpdateReviewCommand::new(result.review.id).with_score(1), &context)
                        .await
                        .map(|_| ())
                }
            }));
        }
        for _ in 0..4 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .create_review(create(product_id, 3), &OperationContext::new())
                    .await
                    .map(|_| ())
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let summary = assert_converged(&store, product_id).await;
        // Three updated to 1, three deleted, four new 3s
        assert_eq!(summary.review_count(), 7);
        assert_eq!(summary.average_score, Some(dec!(2.1429)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_creates_admit_one() {
        let (store, coordinator, product_id) = review_setup().await;
        let user_id = Uuid::new_v4();

        let mut tasks = Vec::new();
        for score in 1..=5 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .create_review(
                        CreateReviewCommand::new(product_id, user_id, score, "Same owner".to_string()),
                        &OperationContext::new(),
                    )
                    .await
            }));
        }

        let mut created = 0;
        let mut duplicates = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(AppError::DuplicateReview { .. }) => duplicates += 1,
                Err(e) => panic!("Unexpected error: {:?}", e),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(duplicates, 4);
        assert_eq!(store.review_count().await, 1);
        assert_converged(&store, product_id).await;
    }

    /// Store whose reads never complete
    struct StalledStore(InMemoryStore);

    #[async_trait]
    impl AggregateStore for StalledStore {
        async fn read_parent(&self, _id: Uuid) -> Result<Option<ProductRating>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn read_children(&self, id: Uuid) -> Result<Vec<Review>, StoreError> {
            self.0.read_children(id).await
        }

        async fn find_review(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
            self.0.find_review(id).await
        }

        async fn find_review_by_owner(
            &self,
            product_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<Review>, StoreError> {
            self.0.find_review_by_owner(product_id, user_id).await
        }

        async fn conditional_write_parent(
            &self,
            product_id: Uuid,
            expected_version: i64,
            summary: &RatingSummary,
            mutation: Option<&ReviewMutation>,
        ) -> Result<ProductRating, StoreError> {
            self.0
                .conditional_write_parent(product_id, expected_version, summary, mutation)
                .await
        }

        async fn list_product_ids(
            &self,
            after: Option<Uuid>,
            limit: i64,
        ) -> Result<Vec<Uuid>, StoreError> {
            self.0.list_product_ids(after, limit).await
        }
    }

    #[tokio::test]
    async fn test_deadline_expires_without_committing() {
        let inner = InMemoryStore::new();
        let product_id = inner.add_product(money(dec!(1.00))).await;
        let store = Arc::new(StalledStore(inner));
        let coordinator = ReviewCoordinator::new(store.clone(), generous_policy())
            .with_timeout(Duration::from_secs(30));

        let context = OperationContext::new().with_deadline(Duration::from_millis(20));
        let result = coordinator.create_review(create(product_id, 5), &context).await;

        assert!(matches!(result, Err(AppError::Timeout(d)) if d == Duration::from_millis(20)));
        assert_eq!(store.0.review_count().await, 0);
        let rating = store.0.read_parent(product_id).await.unwrap().unwrap();
        assert_eq!(rating.version, 0);
    }

    // =========================================================================
    // Orders
    // =========================================================================

    #[tokio::test]
    async fn test_compute_order_total() {
        let store = Arc::new(InMemoryStore::new());
        let product = store.add_product(money(dec!(10.00))).await;
        let handler = order_handler(&store);

        let lines = vec![OrderLine::new(product, 2).unwrap()];
        let total = handler.compute_order_total(&lines, &OperationContext::new()).await.unwrap();
        assert_eq!(total.value(), dec!(24.00));

        let unknown = Uuid::new_v4();
        let lines = vec![OrderLine::new(unknown, 1).unwrap()];
        let result = handler.compute_order_total(&lines, &OperationContext::new()).await;
        match result {
            Err(AppError::InvalidLineReference { product_ids }) => {
                assert_eq!(product_ids, vec![unknown]);
            }
            other => panic!("Expected InvalidLineReference, got: {:?}", other),
        }

        let result = handler.compute_order_total(&[], &OperationContext::new()).await;
        assert!(matches!(result, Err(AppError::EmptyOrder)));
    }

    #[tokio::test]
    async fn test_order_total_is_frozen() {
        let store = Arc::new(InMemoryStore::new());
        let product = store.add_product(money(dec!(10.00))).await;
        let handler = order_handler(&store);
        let context = OperationContext::new();

        let order = handler
            .create_order(
                CreateOrderCommand::new(Uuid::new_v4(), vec![OrderLine::new(product, 2).unwrap()]),
                &context,
            )
            .await
            .unwrap();
        assert_eq!(order.total.value(), dec!(24.00));
        assert_eq!(order.lines[0].unit_price.value(), dec!(10.00));

        store.set_price(product, money(dec!(99.00))).await.unwrap();

        let reloaded = handler.get_order(order.id).await.unwrap();
        assert_eq!(reloaded.total.value(), dec!(24.00));
        assert_eq!(reloaded, order);
    }

    #[tokio::test]
    async fn test_payment_transitions() {
        let store = Arc::new(InMemoryStore::new());
        let product = store.add_product(money(dec!(5.00))).await;
        let handler = order_handler(&store);
        let context = OperationContext::new();

        let order = handler
            .create_order(
                CreateOrderCommand::new(Uuid::new_v4(), vec![OrderLine::new(product, 1).unwrap()]),
                &context,
            )
            .await
            .unwrap();
        assert!(!order.is_paid());

        // Created -> unpaid is a no-op
        let same = handler.transition_payment(order.id, false, &context).await.unwrap();
        assert_eq!(same.version, order.version);

        let paid = handler.transition_payment(order.id, true, &context).await.unwrap();
        assert!(paid.is_paid());
        assert_eq!(paid.total, order.total);

        // Paid again changes nothing
        let again = handler.transition_payment(order.id, true, &context).await.unwrap();
        assert_eq!(again.version, paid.version);

        let result = handler.transition_payment(order.id, false, &context).await;
        assert!(matches!(result, Err(AppError::PaymentReversal(id)) if id == order.id));

        let result = handler.transition_payment(Uuid::new_v4(), true, &context).await;
        assert!(matches!(result, Err(AppError::OrderNotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_are_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let product = store.add_product(money(dec!(7.50))).await;
        let handler = order_handler(&store);

        let order = handler
            .create_order(
                CreateOrderCommand::new(Uuid::new_v4(), vec![OrderLine::new(product, 2).unwrap()]),
                &OperationContext::new(),
            )
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handler = handler.clone();
            let order_id = order.id;
            tasks.push(tokio::spawn(async move {
                handler.transition_payment(order_id, true, &OperationContext::new()).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_paid());
        }

        let stored = handler.get_order(order.id).await.unwrap();
        assert!(stored.is_paid());
        assert_eq!(stored.version, order.version + 1);
        assert_eq!(stored.total.value(), dec!(18.00));
    }

    #[tokio::test]
    async fn test_update_order_lines_reprices() {
        let store = Arc::new(InMemoryStore::new());
        let a = store.add_product(money(dec!(10.00))).await;
        let b = store.add_product(money(dec!(2.50))).await;
        let handler = order_handler(&store);
        let context = OperationContext::new();

        let order = handler
            .create_order(
                CreateOrderCommand::new(Uuid::new_v4(), vec![OrderLine::new(a, 1).unwrap()]),
                &context,
            )
            .await
            .unwrap();

        store.set_price(a, money(dec!(11.00))).await.unwrap();

        let lines = vec![OrderLine::new(a, 1).unwrap(), OrderLine::new(b, 2).unwrap()];
        let updated = handler
            .update_order_lines(UpdateOrderLinesCommand::new(order.id, lines.clone()), &context)
            .await
            .unwrap();

        // (11.00 + 2 * 2.50) * 1.20
        assert_eq!(updated.total.value(), dec!(19.20));
        assert_eq!(updated.lines.len(), 2);
        assert_eq!(updated.version, order.version + 1);

        handler.transition_payment(order.id, true, &context).await.unwrap();
        let result = handler
            .update_order_lines(UpdateOrderLinesCommand::new(order.id, lines), &context)
            .await;
        assert!(matches!(result, Err(AppError::OrderAlreadyPaid(_))));
    }

    #[tokio::test]
    async fn test_create_order_paid_up_front() {
        let store = Arc::new(InMemoryStore::new());
        let product = store.add_product(money(dec!(1.00))).await;
        let handler = order_handler(&store);

        let order = handler
            .create_order(
                CreateOrderCommand::new(Uuid::new_v4(), vec![OrderLine::new(product, 3).unwrap()])
                    .with_payment(true),
                &OperationContext::new(),
            )
            .await
            .unwrap();

        assert!(order.is_paid());
        assert_eq!(order.total.value(), dec!(3.60));
    }
}
