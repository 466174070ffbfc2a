//! Payment share arithmetic for splitting a check by people or by amount.
//!
//! Calculation only, no events: callers present the computed shares and
//! then record ordinary payments against the order. Shares always conserve
//! value, with the remainder of integer-cent rounding assigned to the
//! first share.

use domain::{Money, OrderTotals};

use crate::error::{Result, SagaError};

/// One guest's portion of a split check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentShare {
    /// Pre-tax portion of the share.
    pub subtotal: Money,

    /// Tax portion of the share.
    pub tax: Money,

    /// Amount this share owes: `subtotal + tax`.
    pub total: Money,
}

impl PaymentShare {
    fn from_total(total: Money, tax: Money) -> Self {
        Self {
            subtotal: total - tax,
            tax,
            total,
        }
    }
}

/// The amount left to collect on an order and the tax still embedded in it.
///
/// This is the anchor every share calculation splits: the live balance due,
/// never a caller-supplied figure. On a partially paid order the remaining
/// tax is prorated by the unpaid fraction of the grand total.
pub fn remaining_to_collect(totals: &OrderTotals) -> Result<(Money, Money)> {
    let balance = totals.balance_due;
    if !balance.is_positive() {
        return Err(SagaError::OrderNotReady(format!(
            "balance due is {balance}, nothing left to split"
        )));
    }

    let tax = if totals.paid.is_zero() {
        totals.tax_total
    } else {
        // grand_total > 0 here because balance_due > 0 and paid >= 0.
        Money::from_cents(totals.tax_total.cents() * balance.cents() / totals.grand_total.cents())
    };

    Ok((balance, tax))
}

/// Splits a total and its tax portion into `count` even shares.
///
/// When the total does not divide evenly, the first share carries the
/// whole remainder; the tax remainder lands on the first share the same
/// way.
pub fn split_evenly(total: Money, tax: Money, count: u32) -> Result<Vec<PaymentShare>> {
    if count == 0 {
        return Err(SagaError::InvalidShareCount(count));
    }
    if total.is_negative() {
        return Err(SagaError::NegativeShare(total));
    }
    if tax.is_negative() {
        return Err(SagaError::NegativeShare(tax));
    }

    let count = count as i64;
    let base_total = total.cents() / count;
    let total_remainder = total.cents() % count;
    let base_tax = tax.cents() / count;
    let tax_remainder = tax.cents() % count;

    Ok((0..count)
        .map(|i| {
            let first = i64::from(i == 0);
            PaymentShare::from_total(
                Money::from_cents(base_total + first * total_remainder),
                Money::from_cents(base_tax + first * tax_remainder),
            )
        })
        .collect())
}

/// Validates caller-chosen share amounts against a total and decomposes
/// each into subtotal and tax.
///
/// A rounding drift of at most one cent between the amounts and the total
/// is absorbed by the first share; anything larger is rejected. Tax is
/// apportioned in proportion to each share's amount, with the leftover
/// cents of that division assigned to the first share.
pub fn split_by_amounts(total: Money, tax: Money, amounts: &[Money]) -> Result<Vec<PaymentShare>> {
    if amounts.is_empty() {
        return Err(SagaError::InvalidShareCount(0));
    }
    for amount in amounts {
        if amount.is_negative() {
            return Err(SagaError::NegativeShare(*amount));
        }
    }
    if tax.is_negative() {
        return Err(SagaError::NegativeShare(tax));
    }

    let actual: Money = amounts.iter().copied().sum();
    let drift = total.cents() - actual.cents();
    if drift.abs() > 1 {
        return Err(SagaError::ShareMismatch {
            expected: total,
            actual,
        });
    }

    let mut share_totals = amounts.to_vec();
    share_totals[0] = share_totals[0] + Money::from_cents(drift);
    if share_totals[0].is_negative() {
        return Err(SagaError::ShareMismatch {
            expected: total,
            actual,
        });
    }

    let mut taxes: Vec<Money> = share_totals
        .iter()
        .map(|share| {
            if total.is_positive() {
                Money::from_cents(tax.cents() * share.cents() / total.cents())
            } else {
                Money::zero()
            }
        })
        .collect();
    let apportioned: Money = taxes.iter().copied().sum();
    taxes[0] = taxes[0] + (tax - apportioned);

    Ok(share_totals
        .into_iter()
        .zip(taxes)
        .map(|(total, tax)| PaymentShare::from_total(total, tax))
        .collect())
}
