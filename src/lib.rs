//! review_ledger Library
//!
//! Product rating aggregate under concurrent review writes, and
//! price-frozen order totals. Re-exports modules for integration testing
//! and the binaries.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod handlers;
pub mod jobs;
pub mod pricing;
pub mod retry;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use domain::{DomainError, Money, OperationContext, RatingSummary, Score, TaxRate};
