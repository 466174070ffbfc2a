//! Order domain events.
//!
//! One variant per fact. Each carries only what replay needs; timestamps
//! are captured when the event is built so the apply fold stays
//! deterministic.

use chrono::{DateTime, NaiveDate, Utc};
use common::{AggregateId, OrgId, SiteId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{
    CustomerId, DiscountId, EmployeeId, LineDiscount, LineId, Money, OrderDiscount, OrderKind,
    OrderLine, PaymentId, PaymentSummary, ServiceCharge, TableId,
};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was created.
    Created(CreatedData),

    /// Order was created as the child of a split, seeded with moved lines.
    CreatedFromSplit(CreatedFromSplitData),

    /// A line was added.
    LineAdded(LineAddedData),

    /// A pending line's quantity or note was changed.
    LineUpdated(LineUpdatedData),

    /// A line was voided (kept, excluded from totals).
    LineVoided(LineVoidedData),

    /// A pending line was physically removed.
    LineRemoved(LineRemovedData),

    /// All pending lines were sent to the kitchen.
    Sent(SentData),

    /// An order-level discount was applied.
    DiscountApplied(DiscountAppliedData),

    /// An order-level discount was removed.
    DiscountRemoved(DiscountRemovedData),

    /// A service charge was added.
    ServiceChargeAdded(ServiceChargeAddedData),

    /// A customer was assigned.
    CustomerAssigned(CustomerAssignedData),

    /// A server was assigned.
    ServerAssigned(ServerAssignedData),

    /// The order moved to a different table.
    TableTransferred(TableTransferredData),

    /// A payment was recorded.
    PaymentRecorded(PaymentRecordedData),

    /// A previously recorded payment was reversed.
    PaymentRemoved(PaymentRemovedData),

    /// Order was closed out.
    Closed(ClosedData),

    /// Order was voided.
    Voided(VoidedData),

    /// A closed or voided order was reopened.
    Reopened(ReopenedData),

    /// Pending lines were put on kitchen hold.
    ItemsHeld(ItemsHeldData),

    /// Held lines were released.
    ItemsReleased(ItemsReleasedData),

    /// Lines were assigned to a course.
    CourseSet(CourseSetData),

    /// Pending lines were fired to the kitchen.
    ItemsFired(ItemsFiredData),

    /// A line was assigned to a seat.
    SeatAssigned(SeatAssignedData),

    /// A line-level discount was applied.
    LineDiscountApplied(LineDiscountAppliedData),

    /// A line-level discount was removed.
    LineDiscountRemoved(LineDiscountRemovedData),

    /// A line's price was manually overridden.
    PriceOverridden(PriceOverriddenData),

    /// A subset of lines was moved to a new child order.
    SplitByItems(SplitByItemsData),

    /// Another order's contents were absorbed into this one.
    MergedIn(MergedInData),

    /// This order was absorbed into another order (permanently terminal).
    MergedAway(MergedAwayData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "Created",
            OrderEvent::CreatedFromSplit(_) => "CreatedFromSplit",
            OrderEvent::LineAdded(_) => "LineAdded",
            OrderEvent::LineUpdated(_) => "LineUpdated",
            OrderEvent::LineVoided(_) => "LineVoided",
            OrderEvent::LineRemoved(_) => "LineRemoved",
            OrderEvent::Sent(_) => "Sent",
            OrderEvent::DiscountApplied(_) => "DiscountApplied",
            OrderEvent::DiscountRemoved(_) => "DiscountRemoved",
            OrderEvent::ServiceChargeAdded(_) => "ServiceChargeAdded",
            OrderEvent::CustomerAssigned(_) => "CustomerAssigned",
            OrderEvent::ServerAssigned(_) => "ServerAssigned",
            OrderEvent::TableTransferred(_) => "TableTransferred",
            OrderEvent::PaymentRecorded(_) => "PaymentRecorded",
            OrderEvent::PaymentRemoved(_) => "PaymentRemoved",
            OrderEvent::Closed(_) => "Closed",
            OrderEvent::Voided(_) => "Voided",
            OrderEvent::Reopened(_) => "Reopened",
            OrderEvent::ItemsHeld(_) => "ItemsHeld",
            OrderEvent::ItemsReleased(_) => "ItemsReleased",
            OrderEvent::CourseSet(_) => "CourseSet",
            OrderEvent::ItemsFired(_) => "ItemsFired",
            OrderEvent::SeatAssigned(_) => "SeatAssigned",
            OrderEvent::LineDiscountApplied(_) => "LineDiscountApplied",
            OrderEvent::LineDiscountRemoved(_) => "LineDiscountRemoved",
            OrderEvent::PriceOverridden(_) => "PriceOverridden",
            OrderEvent::SplitByItems(_) => "SplitByItems",
            OrderEvent::MergedIn(_) => "MergedIn",
            OrderEvent::MergedAway(_) => "MergedAway",
        }
    }
}

/// Data for the Created event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedData {
    pub order_id: AggregateId,
    pub organization_id: OrgId,
    pub site_id: SiteId,
    /// Human-readable order number, assigned monotonically by the caller.
    pub order_number: u64,
    pub kind: OrderKind,
    pub table: Option<TableId>,
    pub customer: Option<CustomerId>,
    pub server: Option<EmployeeId>,
    pub guest_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Data for the CreatedFromSplit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedFromSplitData {
    pub order_id: AggregateId,
    pub organization_id: OrgId,
    pub site_id: SiteId,
    pub order_number: u64,
    pub kind: OrderKind,
    pub table: Option<TableId>,
    /// The order the moved lines came from.
    pub parent_order_id: AggregateId,
    /// Moved lines, copied verbatim from the parent.
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
}

/// Data for the LineAdded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineAddedData {
    pub line: OrderLine,
}

/// Data for the LineUpdated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineUpdatedData {
    pub line_id: LineId,
    /// New quantity, if changed.
    pub quantity: Option<u32>,
    /// New note, if changed.
    pub note: Option<String>,
}

/// Data for the LineVoided event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineVoidedData {
    pub line_id: LineId,
    pub voided_by: EmployeeId,
    pub reason: String,
    /// Whether the line had already been sent to the kitchen.
    pub was_sent: bool,
    pub voided_at: DateTime<Utc>,
}

/// Data for the LineRemoved event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRemovedData {
    pub line_id: LineId,
}

/// Data for the Sent event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentData {
    pub sent_by: EmployeeId,
    /// The lines that transitioned to Sent.
    pub line_ids: Vec<LineId>,
    pub sent_at: DateTime<Utc>,
}

/// Data for the DiscountApplied event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountAppliedData {
    pub discount: OrderDiscount,
}

/// Data for the DiscountRemoved event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountRemovedData {
    pub discount_id: DiscountId,
}

/// Data for the ServiceChargeAdded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceChargeAddedData {
    pub charge: ServiceCharge,
}

/// Data for the CustomerAssigned event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAssignedData {
    pub customer_id: CustomerId,
}

/// Data for the ServerAssigned event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAssignedData {
    pub server_id: EmployeeId,
}

/// Data for the TableTransferred event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableTransferredData {
    pub table: TableId,
}

/// Data for the PaymentRecorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecordedData {
    pub payment: PaymentSummary,
}

/// Data for the PaymentRemoved event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRemovedData {
    pub payment_id: PaymentId,
}

/// Data for the Closed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedData {
    pub closed_by: EmployeeId,
    /// Accounting day the sale posts to.
    pub business_date: NaiveDate,
    pub closed_at: DateTime<Utc>,
}

/// Data for the Voided event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidedData {
    pub voided_by: EmployeeId,
    pub reason: String,
    /// Whether downstream consumers should reverse inventory.
    pub reverse_inventory: bool,
    pub voided_at: DateTime<Utc>,
}

/// Data for the Reopened event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReopenedData {
    pub reopened_by: EmployeeId,
    pub reason: String,
    pub reopened_at: DateTime<Utc>,
}

/// Data for the ItemsHeld event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsHeldData {
    /// The lines that qualified for the hold.
    pub line_ids: Vec<LineId>,
    pub held_by: EmployeeId,
    pub reason: String,
    pub held_at: DateTime<Utc>,
}

/// Data for the ItemsReleased event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsReleasedData {
    pub line_ids: Vec<LineId>,
}

/// Data for the CourseSet event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSetData {
    pub line_ids: Vec<LineId>,
    pub course: u32,
}

/// Data for the ItemsFired event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsFiredData {
    /// The lines that transitioned to Sent.
    pub line_ids: Vec<LineId>,
    pub fired_by: EmployeeId,
    /// Set when the fire was course-scoped.
    pub course: Option<u32>,
    pub fired_at: DateTime<Utc>,
}

/// Data for the SeatAssigned event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatAssignedData {
    pub line_id: LineId,
    pub seat: u32,
}

/// Data for the LineDiscountApplied event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDiscountAppliedData {
    pub line_id: LineId,
    pub discount: LineDiscount,
}

/// Data for the LineDiscountRemoved event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDiscountRemovedData {
    pub line_id: LineId,
}

/// Data for the PriceOverridden event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceOverriddenData {
    pub line_id: LineId,
    pub new_price: Money,
    /// The price before the first override; preserved across re-overrides.
    pub original_price: Money,
    pub reason: String,
    pub approved_by: Option<EmployeeId>,
}

/// Data for the SplitByItems event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitByItemsData {
    /// The child order the lines moved to.
    pub child_order_id: AggregateId,
    /// The lines removed from this order.
    pub line_ids: Vec<LineId>,
    pub split_at: DateTime<Utc>,
}

/// Data for the MergedIn event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedInData {
    pub source_order_id: AggregateId,
    /// Non-voided lines copied from the source.
    pub lines: Vec<OrderLine>,
    pub discounts: Vec<OrderDiscount>,
    pub payments: Vec<PaymentSummary>,
    pub merged_at: DateTime<Utc>,
}

/// Data for the MergedAway event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedAwayData {
    pub target_order_id: AggregateId,
    pub merged_at: DateTime<Utc>,
}

// Convenience constructors for events with timestamps
impl OrderEvent {
    /// Creates a Sent event.
    pub fn sent(sent_by: EmployeeId, line_ids: Vec<LineId>) -> Self {
        OrderEvent::Sent(SentData {
            sent_by,
            line_ids,
            sent_at: Utc::now(),
        })
    }

    /// Creates a LineVoided event.
    pub fn line_voided(
        line_id: LineId,
        voided_by: EmployeeId,
        reason: impl Into<String>,
        was_sent: bool,
    ) -> Self {
        OrderEvent::LineVoided(LineVoidedData {
            line_id,
            voided_by,
            reason: reason.into(),
            was_sent,
            voided_at: Utc::now(),
        })
    }

    /// Creates a Closed event.
    pub fn closed(closed_by: EmployeeId, business_date: NaiveDate) -> Self {
        OrderEvent::Closed(ClosedData {
            closed_by,
            business_date,
            closed_at: Utc::now(),
        })
    }

    /// Creates a Voided event.
    pub fn voided(voided_by: EmployeeId, reason: impl Into<String>, reverse_inventory: bool) -> Self {
        OrderEvent::Voided(VoidedData {
            voided_by,
            reason: reason.into(),
            reverse_inventory,
            voided_at: Utc::now(),
        })
    }

    /// Creates a Reopened event.
    pub fn reopened(reopened_by: EmployeeId, reason: impl Into<String>) -> Self {
        OrderEvent::Reopened(ReopenedData {
            reopened_by,
            reason: reason.into(),
            reopened_at: Utc::now(),
        })
    }

    /// Creates an ItemsHeld event.
    pub fn items_held(line_ids: Vec<LineId>, held_by: EmployeeId, reason: impl Into<String>) -> Self {
        OrderEvent::ItemsHeld(ItemsHeldData {
            line_ids,
            held_by,
            reason: reason.into(),
            held_at: Utc::now(),
        })
    }

    /// Creates an ItemsFired event.
    pub fn items_fired(line_ids: Vec<LineId>, fired_by: EmployeeId, course: Option<u32>) -> Self {
        OrderEvent::ItemsFired(ItemsFiredData {
            line_ids,
            fired_by,
            course,
            fired_at: Utc::now(),
        })
    }

    /// Creates a SplitByItems event.
    pub fn split_by_items(child_order_id: AggregateId, line_ids: Vec<LineId>) -> Self {
        OrderEvent::SplitByItems(SplitByItemsData {
            child_order_id,
            line_ids,
            split_at: Utc::now(),
        })
    }

    /// Creates a MergedAway event.
    pub fn merged_away(target_order_id: AggregateId) -> Self {
        OrderEvent::MergedAway(MergedAwayData {
            target_order_id,
            merged_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::LineItemSpec;

    #[test]
    fn test_event_type_names() {
        let event = OrderEvent::sent(EmployeeId::new(), vec![LineId::new()]);
        assert_eq!(event.event_type(), "Sent");

        let event = OrderEvent::line_voided(LineId::new(), EmployeeId::new(), "86'd", false);
        assert_eq!(event.event_type(), "LineVoided");

        let event = OrderEvent::items_fired(vec![LineId::new()], EmployeeId::new(), Some(2));
        assert_eq!(event.event_type(), "ItemsFired");

        let event = OrderEvent::merged_away(AggregateId::new());
        assert_eq!(event.event_type(), "MergedAway");
    }

    #[test]
    fn test_tagged_serialization() {
        let event = OrderEvent::closed(EmployeeId::new(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Closed");
        assert!(json["data"]["business_date"].is_string());

        let deserialized: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized.event_type(), "Closed");
    }

    #[test]
    fn test_line_added_round_trip() {
        let line = OrderLine::from_spec(
            LineId::new(),
            LineItemSpec::new("MENU-001", "Burger", 2, Money::from_cents(1000), 10.0),
        );
        let event = OrderEvent::LineAdded(LineAddedData { line: line.clone() });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: OrderEvent = serde_json::from_str(&json).unwrap();

        if let OrderEvent::LineAdded(data) = deserialized {
            assert_eq!(data.line, line);
        } else {
            panic!("Expected LineAdded event");
        }
    }

    #[test]
    fn test_split_event_round_trip() {
        let child = AggregateId::new();
        let line_ids = vec![LineId::new(), LineId::new()];
        let event = OrderEvent::split_by_items(child, line_ids.clone());

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: OrderEvent = serde_json::from_str(&json).unwrap();

        if let OrderEvent::SplitByItems(data) = deserialized {
            assert_eq!(data.child_order_id, child);
            assert_eq!(data.line_ids, line_ids);
        } else {
            panic!("Expected SplitByItems event");
        }
    }
}
