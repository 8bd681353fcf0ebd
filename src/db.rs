//! Database module
//!
//! Database connection and schema utilities.

use sqlx::PgPool;

/// Tables the stores read and write
const REQUIRED_TABLES: [&str; 3] = ["products", "reviews", "orders"];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Simple connectivity check
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
/// The schema itself lives in sql/schema.sql and is applied out of band
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // Rating commits are conditional on this column
    let has_rating_version: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_schema = 'public'
              AND table_name = 'products'
              AND column_name = 'rating_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !has_rating_version {
        tracing::error!("Column 'products.rating_version' does not exist");
        return Ok(false);
    }

    tracing::info!(tables = ?REQUIRED_TABLES, "Database schema verified");
    Ok(true)
}
