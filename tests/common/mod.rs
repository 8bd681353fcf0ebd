//! Common test utilities

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database named by DATABASE_URL.
///
/// Tests share one database and run in parallel, so each test seeds its own
/// products instead of truncating tables.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    assert!(
        review_ledger::db::check_schema(&pool).await.unwrap(),
        "Apply sql/schema.sql before running integration tests"
    );

    pool
}

/// Insert a product with no reviews and return its id
pub async fn seed_product(pool: &PgPool, price: Decimal) -> Uuid {
    let product_id = Uuid::new_v4();

    sqlx::query("INSERT INTO products (id, name, price) VALUES ($1, $2, $3)")
        .bind(product_id)
        .bind(format!("test product {}", product_id))
        .bind(price)
        .execute(pool)
        .await
        .expect("Failed to seed product");

    product_id
}
