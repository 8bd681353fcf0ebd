//! Money and tax types
//!
//! Domain primitives for order pricing. Amounts are never negative and
//! the rounding rule for totals lives in exactly one place: `Money::round_currency`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Decimal places of the smallest currency unit (cents)
pub const CURRENCY_SCALE: u32 = 2;

/// Tax rate applied when none is configured (20%)
pub const DEFAULT_TAX_RATE: &str = "0.20";

/// A non-negative monetary amount.
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use review_ledger::domain::Money;
///
/// let price = Money::new(Decimal::new(1000, 2)).unwrap();
/// assert_eq!(price.to_string(), "10.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Create a new amount, rejecting negative values
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value < Decimal::ZERO {
            return Err(DomainError::InvalidAmount(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Round to the smallest currency unit, half away from zero.
    pub fn round_currency(value: Decimal) -> Decimal {
        value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s).map_err(|e| DomainError::InvalidAmount(e.to_string()))?;
        Money::new(decimal)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

/// Sales tax rate as a fraction (0.20 = 20%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(Decimal);

impl TaxRate {
    pub fn new(rate: Decimal) -> Result<Self, DomainError> {
        if rate < Decimal::ZERO {
            return Err(DomainError::InvalidTaxRate(rate.to_string()));
        }
        Ok(Self(rate))
    }

    pub fn rate(&self) -> Decimal {
        self.0
    }

    /// Factor applied to a net amount: `1 + rate`
    pub fn multiplier(&self) -> Decimal {
        Decimal::ONE + self.0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self(Decimal::from_str(DEFAULT_TAX_RATE).expect("Invalid DEFAULT_TAX_RATE constant"))
    }
}

impl FromStr for TaxRate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s).map_err(|e| DomainError::InvalidTaxRate(e.to_string()))?;
        TaxRate::new(decimal)
    }
}
