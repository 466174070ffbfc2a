//! Event-sourced order aggregate for a restaurant point of sale.
//!
//! This crate provides:
//! - [`Aggregate`] and [`DomainEvent`] traits for event-sourced entities
//! - [`CommandHandler`] implementing load → validate → append → re-apply
//! - [`CommandMailbox`] serializing commands per aggregate identity
//! - The [`order`] module: the order state machine, totals calculator,
//!   command surface, and downstream notifications

pub mod aggregate;
pub mod command;
pub mod error;
pub mod mailbox;
pub mod order;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use command::{CommandHandler, CommandResult};
pub use error::{DomainError, ErrorCode};
pub use mailbox::CommandMailbox;
pub use order::{
    BundleComponent, CustomerId, DiscountId, DiscountKind, EmployeeId, LineId, LineItemSpec,
    LineStatus, MenuItemId, Modifier, Money, Order, OrderDiscount, OrderError, OrderEvent,
    OrderKind, OrderLine, OrderOpening, OrderService, OrderStatus, OrderTotals, PaymentId,
    PaymentMethod, PaymentSummary, ServiceCharge, SplitOrderReference, TableId,
    publish::{CapturePublisher, LoggingPublisher, Notification, OrderPublisher, PublishError},
};
