//! Orders
//!
//! An order is price-frozen: each line carries the unit price that was current
//! when the order was priced, and `total` is only changed through an explicit
//! re-pricing of its lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DomainError, Money};

/// A requested order line, before pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

impl OrderLine {
    /// Create a line, rejecting quantities below one
    pub fn new(product_id: Uuid, quantity: i64) -> Result<Self, DomainError> {
        if quantity < 1 || quantity > u32::MAX as i64 {
            return Err(DomainError::invalid_quantity(product_id, quantity));
        }
        Ok(Self {
            product_id,
            quantity: quantity as u32,
        })
    }
}

/// An order line with the unit price it was priced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Payment state of an order. `Paid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Paid,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Created
    }
}

/// Outcome of requesting a payment flag on an order in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// Nothing to write: the order is already in the requested state
    Unchanged,
    /// `Created -> Paid`
    MarkPaid,
    /// `Paid -> Created` is never allowed
    Reversal,
}

impl PaymentStatus {
    pub fn from_paid(paid: bool) -> Self {
        if paid {
            Self::Paid
        } else {
            Self::Created
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }

    /// Decide what setting the payment flag to `paid` means from this state
    pub fn transition(&self, paid: bool) -> PaymentTransition {
        match (self, paid) {
            (Self::Created, true) => PaymentTransition::MarkPaid,
            (Self::Paid, false) => PaymentTransition::Reversal,
            _ => PaymentTransition::Unchanged,
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lines: Vec<PricedLine>,
    pub total: Money,
    pub status: PaymentStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.status.is_paid()
    }
}
