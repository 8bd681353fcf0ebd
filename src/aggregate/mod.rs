//! Aggregate module
//!
//! Derived product ratings and the concurrency discipline that keeps them
//! consistent with their reviews.

pub mod recomputer;

pub use recomputer::{AggregateRecomputer, Recomputed};
