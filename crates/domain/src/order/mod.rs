//! Restaurant order aggregate: state machine, lines, totals, kitchen
//! workflow, payments, and downstream notifications.

pub mod aggregate;
pub mod events;
pub mod line;
pub mod publish;
pub mod service;
pub mod state;
pub mod totals;
pub mod value_objects;

pub use aggregate::{Order, OrderOpening, SplitOrderReference};
pub use events::OrderEvent;
pub use line::{
    HoldInfo, LineDiscount, LineItemSpec, LineMap, OrderLine, PriceOverride, VoidInfo,
};
pub use service::OrderService;
pub use state::{LineStatus, OrderStatus};
pub use totals::OrderTotals;
pub use value_objects::{
    BundleComponent, CustomerId, DiscountId, DiscountKind, EmployeeId, LineId, MenuItemId,
    Modifier, Money, OrderDiscount, OrderKind, PaymentId, PaymentMethod, PaymentSummary,
    ServiceCharge, TableId,
};

use thiserror::Error;

use crate::error::{DomainError, ErrorCode};

/// Validation failures raised by the order aggregate.
///
/// Each variant maps to exactly one stable [`ErrorCode`]; no event is ever
/// appended for a command that returns one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("Order does not exist")]
    NotCreated,

    #[error("Order already created")]
    AlreadyCreated,

    #[error("Cannot {action} while order is {current_status}")]
    InvalidStateTransition {
        current_status: OrderStatus,
        action: &'static str,
    },

    #[error("Line {line_id} not found on order")]
    LineNotFound { line_id: LineId },

    #[error("Line {line_id} is {status} and can no longer be changed")]
    LineNotEditable { line_id: LineId, status: LineStatus },

    #[error("Discount {discount_id} not found on order")]
    DiscountNotFound { discount_id: DiscountId },

    #[error("Line {line_id} has no discount to remove")]
    NoLineDiscount { line_id: LineId },

    #[error("Payment {payment_id} not found on order")]
    PaymentNotFound { payment_id: PaymentId },

    #[error("Payment {payment_id} was already recorded")]
    DuplicatePayment { payment_id: PaymentId },

    #[error("Quantity must be positive, got {quantity}")]
    InvalidQuantity { quantity: u32 },

    #[error("Price must not be negative, got {cents} cents")]
    InvalidPrice { cents: i64 },

    #[error("Tax rate must not be negative, got {rate}")]
    InvalidTaxRate { rate: f64 },

    #[error("Discount value is out of range")]
    InvalidDiscount,

    #[error("Service charge rate must not be negative, got {rate}")]
    InvalidServiceChargeRate { rate: f64 },

    #[error("Guest count must be positive, got {guest_count}")]
    InvalidGuestCount { guest_count: u32 },

    #[error("Course number must be at least 1, got {course}")]
    InvalidCourse { course: u32 },

    #[error("Seat number must be at least 1, got {seat}")]
    InvalidSeat { seat: u32 },

    #[error("Payment amount must not be negative, got {cents} cents")]
    InvalidPaymentAmount { cents: i64 },

    #[error("Zero payment rejected while {balance} is still due")]
    ZeroPaymentWithBalanceDue { balance: Money },

    #[error("A reason is required to {action}")]
    MissingReason { action: &'static str },

    #[error("No pending lines to send")]
    NoPendingLines,

    #[error("No lines qualify to {action}")]
    NoQualifyingLines { action: &'static str },

    #[error("Cannot close with {balance} still due")]
    BalanceOutstanding { balance: Money },

    #[error("Split must leave at least one active line on the order")]
    SplitLeavesOrderEmpty,

    #[error("Split must name at least one line")]
    EmptySplit,
}

impl OrderError {
    /// Maps this error to its stable caller-facing code.
    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::NotCreated
            | OrderError::LineNotFound { .. }
            | OrderError::DiscountNotFound { .. }
            | OrderError::NoLineDiscount { .. }
            | OrderError::PaymentNotFound { .. } => ErrorCode::NotFound,

            OrderError::AlreadyCreated | OrderError::DuplicatePayment { .. } => {
                ErrorCode::AlreadyExists
            }

            OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::InvalidTaxRate { .. }
            | OrderError::InvalidDiscount
            | OrderError::InvalidServiceChargeRate { .. }
            | OrderError::InvalidGuestCount { .. }
            | OrderError::InvalidCourse { .. }
            | OrderError::InvalidSeat { .. }
            | OrderError::InvalidPaymentAmount { .. }
            | OrderError::ZeroPaymentWithBalanceDue { .. }
            | OrderError::MissingReason { .. }
            | OrderError::EmptySplit => ErrorCode::InvalidArgument,

            OrderError::InvalidStateTransition { .. }
            | OrderError::LineNotEditable { .. }
            | OrderError::NoPendingLines
            | OrderError::NoQualifyingLines { .. }
            | OrderError::BalanceOutstanding { .. }
            | OrderError::SplitLeavesOrderEmpty => ErrorCode::InvalidState,
        }
    }
}

impl From<OrderError> for DomainError {
    fn from(error: OrderError) -> Self {
        DomainError::Order(error)
    }
}
