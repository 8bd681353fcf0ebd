//! Review score and rating summary
//!
//! `Score` is the value a review contributes to its product.
//! `RatingSummary` is the derived aggregate: the mean of all current scores
//! and the exact set of reviews that produced it.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use super::DomainError;

/// Lowest accepted score
pub const MIN_SCORE: u8 = 1;

/// Highest accepted score
pub const MAX_SCORE: u8 = 5;

/// Decimal places kept on an average rating
pub const RATING_SCALE: u32 = 4;

/// A review score between 1 and 5 inclusive.
///
/// # Example
/// ```
/// use review_ledger::domain::Score;
///
/// let score = Score::new(4).unwrap();
/// assert_eq!(score.value(), 4);
/// assert!(Score::new(6).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    /// Create a validated score
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value < MIN_SCORE as i64 || value > MAX_SCORE as i64 {
            return Err(DomainError::InvalidScore(value));
        }
        Ok(Self(value as u8))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        score.0 as i64
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derived rating of a product.
///
/// # Invariants
/// - `average_score` is the mean of the scores of exactly `review_ids`
/// - `average_score` is `None` iff `review_ids` is empty
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average_score: Option<Decimal>,
    pub review_ids: BTreeSet<Uuid>,
}

impl RatingSummary {
    /// Summary of a product without reviews
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compute the summary from `(review id, score)` pairs.
    ///
    /// The mean is computed exactly and rounded once to `RATING_SCALE` places.
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, Score)>,
    {
        let mut review_ids = BTreeSet::new();
        let mut total: i64 = 0;

        for (id, score) in scores {
            if review_ids.insert(id) {
                total += score.value() as i64;
            }
        }

        let average_score = if review_ids.is_empty() {
            None
        } else {
            let mean = Decimal::from(total) / Decimal::from(review_ids.len() as i64);
            Some(mean.round_dp_with_strategy(RATING_SCALE, RoundingStrategy::MidpointAwayFromZero))
        };

        Self {
            average_score,
            review_ids,
        }
    }

    pub fn review_count(&self) -> usize {
        self.review_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.review_ids.is_empty()
    }
}
