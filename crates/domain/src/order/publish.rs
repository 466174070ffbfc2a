//! Downstream notifications published after events are durably appended.
//!
//! Delivery is at-least-once: a failed publish is logged and never rolls
//! back the append, so consumers must deduplicate by order id and content.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{AggregateId, OrgId};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::{CustomerId, EmployeeId, LineId, OrderLine, OrderTotals};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Notification sent to downstream consumers (kitchen displays, loyalty,
/// inventory, reporting).
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    OrderCreated {
        organization_id: OrgId,
        order_id: AggregateId,
        order_number: u64,
    },
    OrderLineAdded {
        organization_id: OrgId,
        order_id: AggregateId,
        line: OrderLine,
    },
    OrderSentToKitchen {
        organization_id: OrgId,
        order_id: AggregateId,
        line_ids: Vec<LineId>,
    },
    ItemsFiredToKitchen {
        organization_id: OrgId,
        order_id: AggregateId,
        line_ids: Vec<LineId>,
        course: Option<u32>,
    },
    /// Emitted only when the voided line had already been sent; the kitchen
    /// needs to stop preparing it.
    KitchenItemVoided {
        organization_id: OrgId,
        order_id: AggregateId,
        line_id: LineId,
        reason: String,
    },
    /// Close-out summary for loyalty and reporting.
    OrderCompleted {
        organization_id: OrgId,
        order_id: AggregateId,
        order_number: u64,
        business_date: NaiveDate,
        customer: Option<CustomerId>,
        server: Option<EmployeeId>,
        lines: Vec<OrderLine>,
        totals: OrderTotals,
    },
    OrderVoided {
        organization_id: OrgId,
        order_id: AggregateId,
        reason: String,
        /// Present when inventory should restock the listed lines.
        reversed_lines: Option<Vec<OrderLine>>,
    },
    OrdersMerged {
        organization_id: OrgId,
        target_order_id: AggregateId,
        source_order_id: AggregateId,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::OrderCreated { .. } => "OrderCreated",
            Notification::OrderLineAdded { .. } => "OrderLineAdded",
            Notification::OrderSentToKitchen { .. } => "OrderSentToKitchen",
            Notification::ItemsFiredToKitchen { .. } => "ItemsFiredToKitchen",
            Notification::KitchenItemVoided { .. } => "KitchenItemVoided",
            Notification::OrderCompleted { .. } => "OrderCompleted",
            Notification::OrderVoided { .. } => "OrderVoided",
            Notification::OrdersMerged { .. } => "OrdersMerged",
        }
    }
}

/// Sink for order notifications.
#[async_trait]
pub trait OrderPublisher: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<(), PublishError>;
}

/// Publisher that logs each notification. The default sink when no real
/// transport is wired up.
#[derive(Debug, Clone, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl OrderPublisher for LoggingPublisher {
    async fn publish(&self, notification: Notification) -> Result<(), PublishError> {
        tracing::info!(kind = notification.kind(), "Publishing order notification");
        Ok(())
    }
}

/// Publisher that captures notifications in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct CapturePublisher {
    captured: Arc<Mutex<Vec<Notification>>>,
}

impl CapturePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        match self.captured.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn take(&self) -> Vec<Notification> {
        match self.captured.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl OrderPublisher for CapturePublisher {
    async fn publish(&self, notification: Notification) -> Result<(), PublishError> {
        match self.captured.lock() {
            Ok(mut guard) => guard.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}
