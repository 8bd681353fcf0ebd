//! Domain module
//!
//! Core domain types and validation rules.

pub mod context;
pub mod error;
pub mod money;
pub mod order;
pub mod review;
pub mod score;

pub use context::OperationContext;
pub use error::DomainError;
pub use money::{Money, TaxRate, CURRENCY_SCALE};
pub use order::{Order, OrderLine, PaymentStatus, PaymentTransition, PricedLine};
pub use review::{ProductRating, Review, ReviewContent, ReviewMutation};
pub use score::{RatingSummary, Score, RATING_SCALE};
