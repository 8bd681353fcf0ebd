//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::TaxRate;
use crate::pricing::DuplicateLinePolicy;
use crate::retry::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// Sales tax rate applied to order lines
    pub tax_rate: TaxRate,

    /// Merge repeated product ids in an order instead of rejecting them
    pub allow_duplicate_order_lines: bool,

    /// Attempts for one optimistic read-compute-write cycle
    pub recompute_max_attempts: u32,

    /// Backoff ceiling before the first retry
    pub recompute_base_delay: Duration,

    /// Upper bound for a single backoff delay
    pub recompute_max_delay: Duration,

    /// Deadline for operations whose caller supplies none
    pub operation_timeout: Duration,

    /// How often the rating reconciliation sweep runs
    pub reconcile_interval: Duration,

    /// Products recomputed per page of the sweep
    pub reconcile_batch_size: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            tax_rate: parse_env("TAX_RATE", crate::domain::money::DEFAULT_TAX_RATE)?,
            allow_duplicate_order_lines: parse_env("ALLOW_DUPLICATE_ORDER_LINES", "true")?,
            recompute_max_attempts: parse_env("RECOMPUTE_MAX_ATTEMPTS", "5")?,
            recompute_base_delay: Duration::from_millis(parse_env(
                "RECOMPUTE_BASE_DELAY_MS",
                "20",
            )?),
            recompute_max_delay: Duration::from_millis(parse_env("RECOMPUTE_MAX_DELAY_MS", "500")?),
            operation_timeout: Duration::from_millis(parse_env("OPERATION_TIMEOUT_MS", "5000")?),
            reconcile_interval: Duration::from_secs(parse_env("RECONCILE_INTERVAL_SECS", "300")?),
            reconcile_batch_size: parse_env("RECONCILE_BATCH_SIZE", "200")?,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.recompute_max_attempts,
            self.recompute_base_delay,
            self.recompute_max_delay,
        )
    }

    pub fn duplicate_line_policy(&self) -> DuplicateLinePolicy {
        if self.allow_duplicate_order_lines {
            DuplicateLinePolicy::Merge
        } else {
            DuplicateLinePolicy::Reject
        }
    }
}

/// Read `name`, falling back to `default`, and parse it
fn parse_env<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    parse_value(name, env::var(name).ok().as_deref().unwrap_or(default))
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_value() {
        let tax: TaxRate = parse_value("TAX_RATE", "0.07").unwrap();
        assert_eq!(tax.multiplier(), dec!(1.07));

        let attempts: u32 = parse_value("RECOMPUTE_MAX_ATTEMPTS", " 8 ").unwrap();
        assert_eq!(attempts, 8);

        let flag: bool = parse_value("ALLOW_DUPLICATE_ORDER_LINES", "false").unwrap();
        assert!(!flag);
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let result: Result<u32, _> = parse_value("DATABASE_MAX_CONNECTIONS", "many");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))
        ));

        let result: Result<TaxRate, _> = parse_value("TAX_RATE", "-0.2");
        assert!(result.is_err());
    }

    #[test]
    fn test_derived_policies() {
        let config = Config {
            database_url: "postgres://localhost/test".to_string(),
            database_max_connections: 5,
            environment: "production".to_string(),
            tax_rate: TaxRate::default(),
            allow_duplicate_order_lines: false,
            recompute_max_attempts: 7,
            recompute_base_delay: Duration::from_millis(5),
            recompute_max_delay: Duration::from_millis(50),
            operation_timeout: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(60),
            reconcile_batch_size: 10,
        };

        assert!(config.is_production());
        assert_eq!(config.duplicate_line_policy(), DuplicateLinePolicy::Reject);
        assert_eq!(config.retry_policy().max_attempts, 7);
        assert_eq!(config.retry_policy().max_delay, Duration::from_millis(50));
    }
}
