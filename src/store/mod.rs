//! Store module
//!
//! Persistence ports and their adapters.
//! All writes to rating and order fields are single-row conditional updates.

mod error;
pub mod memory;
mod ports;
pub mod postgres;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use ports::{AggregateStore, OrderStore, PriceCatalog};
pub use postgres::PgStore;
