//! Order and line state machines.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Open ──► Sent ──► PartiallyPaid ──► Paid ──► Closed ──┐
///   │        │            │            │                ├──► Reopened (Open)
///   └────────┴────────────┴────────────┴──► Voided ─────┘
///
/// Open/Sent ──► MergedAway (permanently terminal)
/// ```
///
/// `PartiallyPaid` and `Paid` are derived from the totals after every
/// payment event; `Sent` is the kitchen-flow status. `Closed` and `Voided`
/// can be reopened; `MergedAway` cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order is open for modification; nothing sent to the kitchen yet.
    #[default]
    Open,

    /// At least one line has been sent to the kitchen.
    Sent,

    /// Some money has been collected but a balance remains.
    PartiallyPaid,

    /// Balance due is settled (paid amount covers the grand total).
    Paid,

    /// Order was closed out (terminal unless reopened).
    Closed,

    /// Order was voided (terminal unless reopened).
    Voided,

    /// Order was absorbed into another order (permanently terminal).
    MergedAway,
}

impl OrderStatus {
    /// Returns true if lines, discounts, and service charges can be changed.
    pub fn can_modify(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Closed | OrderStatus::Voided | OrderStatus::MergedAway
        )
    }

    /// Returns true if a payment can be recorded or removed.
    ///
    /// Voided and merged-away orders reject payments; a closed order still
    /// accepts them (tip adjustments arrive after close-out).
    pub fn can_record_payment(&self) -> bool {
        !matches!(self, OrderStatus::Voided | OrderStatus::MergedAway)
    }

    /// Returns true if the order can be closed from this status.
    pub fn can_close(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Closed | OrderStatus::Voided | OrderStatus::MergedAway
        )
    }

    /// Returns true if the order can be voided from this status.
    pub fn can_void(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Closed | OrderStatus::Voided | OrderStatus::MergedAway
        )
    }

    /// Returns true if the order can be reopened from this status.
    pub fn can_reopen(&self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Voided)
    }

    /// Returns true if the order can be merged into another order.
    pub fn can_merge_away(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Closed | OrderStatus::Voided | OrderStatus::MergedAway
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Closed | OrderStatus::Voided | OrderStatus::MergedAway
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "Open",
            OrderStatus::Sent => "Sent",
            OrderStatus::PartiallyPaid => "PartiallyPaid",
            OrderStatus::Paid => "Paid",
            OrderStatus::Closed => "Closed",
            OrderStatus::Voided => "Voided",
            OrderStatus::MergedAway => "MergedAway",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LineStatus {
    /// Not yet sent to the kitchen; may be edited, removed, held, or fired.
    #[default]
    Pending,

    /// Sent to the kitchen; no longer editable or removable.
    Sent,

    /// Voided; excluded from totals and kitchen work.
    Voided,
}

impl LineStatus {
    /// Returns true if the line counts toward totals.
    pub fn is_active(&self) -> bool {
        !matches!(self, LineStatus::Voided)
    }

    /// Returns true if the line can still be edited or removed.
    pub fn can_edit(&self) -> bool {
        matches!(self, LineStatus::Pending)
    }

    /// Returns true if the line is eligible for hold/release/fire.
    pub fn can_fire(&self) -> bool {
        matches!(self, LineStatus::Pending)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Pending => "Pending",
            LineStatus::Sent => "Sent",
            LineStatus::Voided => "Voided",
        }
    }
}

impl std::fmt::Display for LineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
