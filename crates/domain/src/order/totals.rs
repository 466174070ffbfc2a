//! Order totals calculation.
//!
//! Totals are always recomputed in full from the live lines, discounts,
//! charges, and payments. Nothing is incrementally adjusted, so the core
//! invariant `grand = subtotal - discount + service + tax` cannot drift.

use serde::{Deserialize, Serialize};

use super::{LineMap, Money, OrderDiscount, PaymentSummary, ServiceCharge};

/// Monetary totals derived from the order's current contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    /// Sum of non-voided line totals (net of line discounts).
    pub subtotal: Money,

    /// Sum of order-level discount amounts, capped at the subtotal.
    pub discount_total: Money,

    /// Sum of service-charge amounts.
    pub service_charge_total: Money,

    /// Sum of per-line tax amounts.
    pub tax_total: Money,

    /// `subtotal - discount_total + service_charge_total + tax_total`.
    pub grand_total: Money,

    /// Sum of recorded payment amounts (tips excluded).
    pub paid: Money,

    /// Sum of recorded tips.
    pub tip_total: Money,

    /// `grand_total - paid`.
    pub balance_due: Money,
}

impl OrderTotals {
    /// Computes totals from the order's live contents.
    pub fn calculate(
        lines: &LineMap,
        discounts: &[OrderDiscount],
        charges: &[ServiceCharge],
        payments: &[PaymentSummary],
    ) -> Self {
        let subtotal: Money = lines.active().map(|line| line.line_total()).sum();
        let tax_total: Money = lines.active().map(|line| line.tax_amount()).sum();

        let discount_total: Money = discounts
            .iter()
            .map(|discount| discount.kind.amount_against(subtotal))
            .sum::<Money>()
            .min(subtotal);

        let service_charge_total: Money = charges
            .iter()
            .map(|charge| charge.amount_against(subtotal))
            .sum();

        let grand_total = subtotal - discount_total + service_charge_total + tax_total;

        let paid: Money = payments.iter().map(|payment| payment.amount).sum();
        let tip_total: Money = payments.iter().map(|payment| payment.tip).sum();

        Self {
            subtotal,
            discount_total,
            service_charge_total,
            tax_total,
            grand_total,
            paid,
            tip_total,
            balance_due: grand_total - paid,
        }
    }

    /// Returns true if the balance due is settled.
    pub fn is_settled(&self) -> bool {
        !self.balance_due.is_positive()
    }

    /// Checks the structural invariant; used by replay assertions.
    pub fn holds_invariant(&self) -> bool {
        self.grand_total
            == self.subtotal - self.discount_total + self.service_charge_total + self.tax_total
            && self.balance_due == self.grand_total - self.paid
    }
}
