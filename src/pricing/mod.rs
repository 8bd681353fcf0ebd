//! Order pricing
//!
//! `compute_total` is the single place where unit prices, quantities, tax and
//! rounding meet. Rounding rule: each line is `unit_price * quantity * (1 + tax)`
//! computed exactly, lines are summed exactly, and the sum is rounded once to
//! the smallest currency unit (half away from zero).

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Money, OrderLine, PricedLine, TaxRate};
use crate::error::{AppError, AppResult};
use crate::store::PriceCatalog;

/// What to do when the same product appears on several lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateLinePolicy {
    /// Sum the quantities into the first occurrence
    #[default]
    Merge,
    /// Reject the order
    Reject,
}

/// Lines with their frozen unit prices and the resulting total
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub total: Money,
}

/// Validate line structure and apply the duplicate policy.
///
/// Keeps the order of first occurrence.
pub fn normalize_lines(
    lines: &[OrderLine],
    policy: DuplicateLinePolicy,
) -> AppResult<Vec<OrderLine>> {
    if lines.is_empty() {
        return Err(AppError::EmptyOrder);
    }

    let mut normalized: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(crate::domain::DomainError::invalid_quantity(line.product_id, 0).into());
        }

        match normalized.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => match policy {
                DuplicateLinePolicy::Merge => {
                    existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(
                        || AppError::InvalidRequest("Order line quantity overflow".to_string()),
                    )?;
                }
                DuplicateLinePolicy::Reject => {
                    return Err(AppError::InvalidRequest(format!(
                        "Product {} appears on more than one line",
                        line.product_id
                    )));
                }
            },
            None => normalized.push(*line),
        }
    }

    Ok(normalized)
}

/// Price `lines` against `prices` and compute the taxed total.
///
/// Fails with `InvalidLineReference` listing every product missing from
/// `prices`; a partial total is never produced.
pub fn compute_total(
    lines: &[OrderLine],
    prices: &HashMap<Uuid, Money>,
    tax: TaxRate,
) -> AppResult<PricedOrder> {
    if lines.is_empty() {
        return Err(AppError::EmptyOrder);
    }

    let mut missing: Vec<Uuid> = Vec::new();
    for line in lines {
        if !prices.contains_key(&line.product_id) && !missing.contains(&line.product_id) {
            missing.push(line.product_id);
        }
    }
    if !missing.is_empty() {
        return Err(AppError::InvalidLineReference {
            product_ids: missing,
        });
    }

    let overflow = || AppError::InvalidRequest("Order total overflow".to_string());
    let multiplier = tax.multiplier();
    let mut gross = Decimal::ZERO;
    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        let unit_price = prices[&line.product_id];
        let line_gross = unit_price
            .value()
            .checked_mul(Decimal::from(line.quantity))
            .and_then(|net| net.checked_mul(multiplier))
            .ok_or_else(overflow)?;
        gross = gross.checked_add(line_gross).ok_or_else(overflow)?;

        priced.push(PricedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price,
        });
    }

    Ok(PricedOrder {
        lines: priced,
        total: Money::new(Money::round_currency(gross))?,
    })
}

/// Resolves prices for a set of order lines and computes the total.
#[derive(Clone)]
pub struct OrderTotalCalculator {
    catalog: Arc<dyn PriceCatalog>,
    tax: TaxRate,
    policy: DuplicateLinePolicy,
}

impl OrderTotalCalculator {
    pub fn new(catalog: Arc<dyn PriceCatalog>, tax: TaxRate, policy: DuplicateLinePolicy) -> Self {
        Self {
            catalog,
            tax,
            policy,
        }
    }

    pub fn tax(&self) -> TaxRate {
        self.tax
    }

    /// Compute only the total for `lines`
    pub async fn compute_total(&self, lines: &[OrderLine]) -> AppResult<Money> {
        Ok(self.price_lines(lines).await?.total)
    }

    /// Price every line with one bulk catalog lookup
    pub async fn price_lines(&self, lines: &[OrderLine]) -> AppResult<PricedOrder> {
        let lines = normalize_lines(lines, self.policy)?;

        let mut seen = HashSet::with_capacity(lines.len());
        let product_ids: Vec<Uuid> = lines
            .iter()
            .map(|l| l.product_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let prices = self.catalog.bulk_get_prices(&product_ids).await?;

        let priced = compute_total(&lines, &prices, self.tax);
        if let Err(AppError::InvalidLineReference { product_ids }) = &priced {
            tracing::debug!(missing = ?product_ids, "Order references unknown products");
        }
        priced
    }
}
