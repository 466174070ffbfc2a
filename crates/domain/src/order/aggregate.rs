//! Order aggregate implementation.

use chrono::{DateTime, NaiveDate, Utc};
use common::{AggregateId, OrgId, SiteId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{
    CustomerId, DiscountId, DiscountKind, EmployeeId, HoldInfo, LineDiscount, LineId, LineItemSpec,
    LineMap, LineStatus, Money, OrderDiscount, OrderError, OrderEvent, OrderKind, OrderLine,
    OrderStatus, OrderTotals, PaymentId, PaymentMethod, PaymentSummary, PriceOverride,
    ServiceCharge, TableId, VoidInfo,
    events::{
        CourseSetData, CreatedData, CreatedFromSplitData, CustomerAssignedData,
        DiscountAppliedData, DiscountRemovedData, ItemsFiredData, ItemsHeldData, ItemsReleasedData,
        LineAddedData, LineDiscountAppliedData, LineDiscountRemovedData, LineRemovedData,
        LineUpdatedData, LineVoidedData, MergedInData, PaymentRecordedData, PaymentRemovedData,
        PriceOverriddenData, SeatAssignedData, SentData, ServerAssignedData,
        ServiceChargeAddedData, SplitByItemsData, TableTransferredData,
    },
};

/// Header data for opening a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOpening {
    pub organization_id: OrgId,
    pub site_id: SiteId,
    /// Human-readable order number, assigned monotonically by the caller.
    pub order_number: u64,
    pub kind: OrderKind,
    #[serde(default)]
    pub table: Option<TableId>,
    #[serde(default)]
    pub customer: Option<CustomerId>,
    #[serde(default)]
    pub server: Option<EmployeeId>,
    pub guest_count: u32,
}

impl OrderOpening {
    pub fn new(
        organization_id: OrgId,
        site_id: SiteId,
        order_number: u64,
        kind: OrderKind,
        guest_count: u32,
    ) -> Self {
        Self {
            organization_id,
            site_id,
            order_number,
            kind,
            table: None,
            customer: None,
            server: None,
            guest_count,
        }
    }

    pub fn at_table(mut self, table: impl Into<TableId>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn for_customer(mut self, customer: CustomerId) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn served_by(mut self, server: EmployeeId) -> Self {
        self.server = Some(server);
        self
    }
}

/// Back-reference recording that lines were moved to a child order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOrderReference {
    pub child_order_id: AggregateId,
    pub line_ids: Vec<LineId>,
    pub split_at: DateTime<Utc>,
}

/// Order aggregate root.
///
/// State is only ever changed by the `apply` fold; command methods validate
/// against current state and return events without mutating anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    organization_id: Option<OrgId>,
    site_id: Option<SiteId>,
    order_number: u64,
    kind: Option<OrderKind>,
    table: Option<TableId>,
    customer: Option<CustomerId>,
    server: Option<EmployeeId>,
    guest_count: u32,

    status: OrderStatus,
    lines: LineMap,
    discounts: Vec<OrderDiscount>,
    charges: Vec<ServiceCharge>,
    payments: Vec<PaymentSummary>,

    /// Derived cache; recomputed in full after every structural event.
    totals: OrderTotals,

    parent_order: Option<AggregateId>,
    splits: Vec<SplitOrderReference>,
    merged_sources: Vec<AggregateId>,
    merged_into: Option<AggregateId>,

    created_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    closed_by: Option<EmployeeId>,
    business_date: Option<NaiveDate>,
    voided_at: Option<DateTime<Utc>>,
    voided_by: Option<EmployeeId>,
    void_reason: Option<String>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn organization_id(&self) -> Option<OrgId> {
        self.organization_id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::Created(data) => self.apply_created(data),
            OrderEvent::CreatedFromSplit(data) => self.apply_created_from_split(data),
            OrderEvent::LineAdded(data) => self.apply_line_added(data),
            OrderEvent::LineUpdated(data) => self.apply_line_updated(data),
            OrderEvent::LineVoided(data) => self.apply_line_voided(data),
            OrderEvent::LineRemoved(data) => self.apply_line_removed(data),
            OrderEvent::Sent(data) => self.apply_sent(data),
            OrderEvent::DiscountApplied(data) => self.apply_discount_applied(data),
            OrderEvent::DiscountRemoved(data) => self.apply_discount_removed(data),
            OrderEvent::ServiceChargeAdded(data) => self.apply_service_charge_added(data),
            OrderEvent::CustomerAssigned(data) => self.apply_customer_assigned(data),
            OrderEvent::ServerAssigned(data) => self.apply_server_assigned(data),
            OrderEvent::TableTransferred(data) => self.apply_table_transferred(data),
            OrderEvent::PaymentRecorded(data) => self.apply_payment_recorded(data),
            OrderEvent::PaymentRemoved(data) => self.apply_payment_removed(data),
            OrderEvent::Closed(data) => self.apply_closed(data),
            OrderEvent::Voided(data) => self.apply_voided(data),
            OrderEvent::Reopened(_) => self.apply_reopened(),
            OrderEvent::ItemsHeld(data) => self.apply_items_held(data),
            OrderEvent::ItemsReleased(data) => self.apply_items_released(data),
            OrderEvent::CourseSet(data) => self.apply_course_set(data),
            OrderEvent::ItemsFired(data) => self.apply_items_fired(data),
            OrderEvent::SeatAssigned(data) => self.apply_seat_assigned(data),
            OrderEvent::LineDiscountApplied(data) => self.apply_line_discount_applied(data),
            OrderEvent::LineDiscountRemoved(data) => self.apply_line_discount_removed(data),
            OrderEvent::PriceOverridden(data) => self.apply_price_overridden(data),
            OrderEvent::SplitByItems(data) => self.apply_split_by_items(data),
            OrderEvent::MergedIn(data) => self.apply_merged_in(data),
            OrderEvent::MergedAway(data) => self.apply_merged_away(data),
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Order {
    pub fn site_id(&self) -> Option<SiteId> {
        self.site_id
    }

    pub fn order_number(&self) -> u64 {
        self.order_number
    }

    pub fn kind(&self) -> Option<OrderKind> {
        self.kind
    }

    pub fn table(&self) -> Option<&TableId> {
        self.table.as_ref()
    }

    pub fn customer(&self) -> Option<CustomerId> {
        self.customer
    }

    pub fn server(&self) -> Option<EmployeeId> {
        self.server
    }

    pub fn guest_count(&self) -> u32 {
        self.guest_count
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &LineMap {
        &self.lines
    }

    pub fn line(&self, id: &LineId) -> Option<&OrderLine> {
        self.lines.get(id)
    }

    pub fn discounts(&self) -> &[OrderDiscount] {
        &self.discounts
    }

    pub fn charges(&self) -> &[ServiceCharge] {
        &self.charges
    }

    pub fn payments(&self) -> &[PaymentSummary] {
        &self.payments
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn parent_order(&self) -> Option<AggregateId> {
        self.parent_order
    }

    pub fn splits(&self) -> &[SplitOrderReference] {
        &self.splits
    }

    pub fn merged_into(&self) -> Option<AggregateId> {
        self.merged_into
    }

    pub fn merged_sources(&self) -> &[AggregateId] {
        &self.merged_sources
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn business_date(&self) -> Option<NaiveDate> {
        self.business_date
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Snapshot of the non-voided lines, in insertion order.
    pub fn active_lines(&self) -> Vec<OrderLine> {
        self.lines.active().cloned().collect()
    }
}

// Command methods (validate, return events, never mutate)
impl Order {
    /// Opens a new order.
    pub fn create(
        &self,
        order_id: AggregateId,
        opening: OrderOpening,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        if opening.guest_count == 0 {
            return Err(OrderError::InvalidGuestCount { guest_count: 0 });
        }

        Ok(vec![OrderEvent::Created(CreatedData {
            order_id,
            organization_id: opening.organization_id,
            site_id: opening.site_id,
            order_number: opening.order_number,
            kind: opening.kind,
            table: opening.table,
            customer: opening.customer,
            server: opening.server,
            guest_count: opening.guest_count,
            created_at: Utc::now(),
        })])
    }

    /// Opens a new order seeded with lines moved from a parent order.
    #[allow(clippy::too_many_arguments)]
    pub fn create_from_split(
        &self,
        order_id: AggregateId,
        organization_id: OrgId,
        site_id: SiteId,
        order_number: u64,
        kind: OrderKind,
        table: Option<TableId>,
        parent_order_id: AggregateId,
        lines: Vec<OrderLine>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        if lines.is_empty() {
            return Err(OrderError::EmptySplit);
        }

        Ok(vec![OrderEvent::CreatedFromSplit(CreatedFromSplitData {
            order_id,
            organization_id,
            site_id,
            order_number,
            kind,
            table,
            parent_order_id,
            lines,
            created_at: Utc::now(),
        })])
    }

    /// Adds a line from a spec.
    pub fn add_line(&self, spec: LineItemSpec) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("add line")?;

        if spec.quantity == 0 {
            return Err(OrderError::InvalidQuantity { quantity: 0 });
        }
        if spec.unit_price.is_negative() {
            return Err(OrderError::InvalidPrice {
                cents: spec.unit_price.cents(),
            });
        }
        if spec.tax_rate < 0.0 {
            return Err(OrderError::InvalidTaxRate {
                rate: spec.tax_rate,
            });
        }

        let line = OrderLine::from_spec(LineId::new(), spec);
        Ok(vec![OrderEvent::LineAdded(LineAddedData { line })])
    }

    /// Updates a pending line's quantity and/or note.
    pub fn update_line(
        &self,
        line_id: LineId,
        quantity: Option<u32>,
        note: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("update line")?;
        let line = self.require_line(line_id)?;

        if !line.status.can_edit() {
            return Err(OrderError::LineNotEditable {
                line_id,
                status: line.status,
            });
        }
        if let Some(0) = quantity {
            return Err(OrderError::InvalidQuantity { quantity: 0 });
        }
        if quantity.is_none() && note.is_none() {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::LineUpdated(LineUpdatedData {
            line_id,
            quantity,
            note,
        })])
    }

    /// Voids a line, keeping it on the order but out of the totals.
    pub fn void_line(
        &self,
        line_id: LineId,
        voided_by: EmployeeId,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("void line")?;
        let line = self.require_line(line_id)?;

        if line.status == LineStatus::Voided {
            return Err(OrderError::LineNotEditable {
                line_id,
                status: line.status,
            });
        }
        let reason = non_empty_reason(reason, "void line")?;

        Ok(vec![OrderEvent::line_voided(
            line_id,
            voided_by,
            reason,
            line.status == LineStatus::Sent,
        )])
    }

    /// Physically removes a line. Only valid before the line is sent.
    pub fn remove_line(&self, line_id: LineId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("remove line")?;
        let line = self.require_line(line_id)?;

        if !line.status.can_edit() {
            return Err(OrderError::LineNotEditable {
                line_id,
                status: line.status,
            });
        }

        Ok(vec![OrderEvent::LineRemoved(LineRemovedData { line_id })])
    }

    /// Sends all pending, unheld lines to the kitchen.
    pub fn send(&self, sent_by: EmployeeId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("send")?;

        let line_ids: Vec<LineId> = self
            .lines
            .iter()
            .filter(|line| line.can_fire())
            .map(|line| line.id)
            .collect();

        if line_ids.is_empty() {
            return Err(OrderError::NoPendingLines);
        }

        Ok(vec![OrderEvent::sent(sent_by, line_ids)])
    }

    /// Applies an order-level discount.
    pub fn apply_discount(
        &self,
        kind: DiscountKind,
        reason: impl Into<String>,
        approved_by: Option<EmployeeId>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("apply discount")?;

        if !kind.is_valid() {
            return Err(OrderError::InvalidDiscount);
        }
        let reason = non_empty_reason(reason, "apply discount")?;

        Ok(vec![OrderEvent::DiscountApplied(DiscountAppliedData {
            discount: OrderDiscount {
                id: DiscountId::new(),
                kind,
                reason,
                approved_by,
            },
        })])
    }

    /// Removes an order-level discount by instance id.
    pub fn remove_discount(&self, discount_id: DiscountId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("remove discount")?;

        if !self.discounts.iter().any(|d| d.id == discount_id) {
            return Err(OrderError::DiscountNotFound { discount_id });
        }

        Ok(vec![OrderEvent::DiscountRemoved(DiscountRemovedData {
            discount_id,
        })])
    }

    /// Adds a service charge.
    pub fn add_service_charge(
        &self,
        name: impl Into<String>,
        rate: f64,
        taxable: bool,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("add service charge")?;

        if rate < 0.0 {
            return Err(OrderError::InvalidServiceChargeRate { rate });
        }

        Ok(vec![OrderEvent::ServiceChargeAdded(
            ServiceChargeAddedData {
                charge: ServiceCharge {
                    name: name.into(),
                    rate,
                    taxable,
                },
            },
        )])
    }

    /// Assigns a customer. Metadata only, allowed in any status.
    pub fn assign_customer(&self, customer_id: CustomerId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        Ok(vec![OrderEvent::CustomerAssigned(CustomerAssignedData {
            customer_id,
        })])
    }

    /// Assigns a server. Metadata only, allowed in any status.
    pub fn assign_server(&self, server_id: EmployeeId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        Ok(vec![OrderEvent::ServerAssigned(ServerAssignedData {
            server_id,
        })])
    }

    /// Moves the order to a different table.
    pub fn transfer_table(&self, table: impl Into<TableId>) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("transfer table")?;
        Ok(vec![OrderEvent::TableTransferred(TableTransferredData {
            table: table.into(),
        })])
    }

    /// Records a payment.
    ///
    /// A zero amount is rejected while a balance is due; it is accepted once
    /// the balance is settled (covers fully discounted orders).
    pub fn record_payment(
        &self,
        payment_id: PaymentId,
        amount: Money,
        tip: Money,
        method: PaymentMethod,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.status.can_record_payment() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "record payment",
            });
        }
        if amount.is_negative() {
            return Err(OrderError::InvalidPaymentAmount {
                cents: amount.cents(),
            });
        }
        if tip.is_negative() {
            return Err(OrderError::InvalidPaymentAmount { cents: tip.cents() });
        }
        if amount.is_zero() && self.totals.balance_due.is_positive() {
            return Err(OrderError::ZeroPaymentWithBalanceDue {
                balance: self.totals.balance_due,
            });
        }
        if self.payments.iter().any(|p| p.id == payment_id) {
            return Err(OrderError::DuplicatePayment { payment_id });
        }

        Ok(vec![OrderEvent::PaymentRecorded(PaymentRecordedData {
            payment: PaymentSummary {
                id: payment_id,
                amount,
                tip,
                method,
                recorded_at: Utc::now(),
            },
        })])
    }

    /// Reverses a previously recorded payment.
    pub fn remove_payment(&self, payment_id: PaymentId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.status.can_record_payment() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "remove payment",
            });
        }
        if !self.payments.iter().any(|p| p.id == payment_id) {
            return Err(OrderError::PaymentNotFound { payment_id });
        }

        Ok(vec![OrderEvent::PaymentRemoved(PaymentRemovedData {
            payment_id,
        })])
    }

    /// Closes the order. The balance due must be settled.
    pub fn close(
        &self,
        closed_by: EmployeeId,
        business_date: NaiveDate,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.status.can_close() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "close",
            });
        }
        if self.totals.balance_due.is_positive() {
            return Err(OrderError::BalanceOutstanding {
                balance: self.totals.balance_due,
            });
        }

        Ok(vec![OrderEvent::closed(closed_by, business_date)])
    }

    /// Voids the order.
    pub fn void(
        &self,
        voided_by: EmployeeId,
        reason: impl Into<String>,
        reverse_inventory: bool,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.status.can_void() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "void",
            });
        }
        let reason = non_empty_reason(reason, "void")?;

        Ok(vec![OrderEvent::voided(voided_by, reason, reverse_inventory)])
    }

    /// Reopens a closed or voided order.
    pub fn reopen(
        &self,
        reopened_by: EmployeeId,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.status.can_reopen() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "reopen",
            });
        }
        let reason = non_empty_reason(reason, "reopen")?;

        Ok(vec![OrderEvent::reopened(reopened_by, reason)])
    }

    /// Puts pending, unheld lines on kitchen hold.
    ///
    /// Ids that do not qualify are ignored; the command fails only when no
    /// id qualifies.
    pub fn hold_items(
        &self,
        line_ids: &[LineId],
        held_by: EmployeeId,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("hold items")?;
        let reason = non_empty_reason(reason, "hold items")?;

        let qualifying = self.qualifying_lines(line_ids, |line| line.can_fire());
        if qualifying.is_empty() {
            return Err(OrderError::NoQualifyingLines {
                action: "hold items",
            });
        }

        Ok(vec![OrderEvent::items_held(qualifying, held_by, reason)])
    }

    /// Releases held lines.
    pub fn release_items(&self, line_ids: &[LineId]) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("release items")?;

        let qualifying = self.qualifying_lines(line_ids, |line| line.hold.is_some());
        if qualifying.is_empty() {
            return Err(OrderError::NoQualifyingLines {
                action: "release items",
            });
        }

        Ok(vec![OrderEvent::ItemsReleased(ItemsReleasedData {
            line_ids: qualifying,
        })])
    }

    /// Assigns pending lines to a course.
    pub fn set_item_course(
        &self,
        line_ids: &[LineId],
        course: u32,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("set course")?;

        if course == 0 {
            return Err(OrderError::InvalidCourse { course });
        }

        let qualifying = self.qualifying_lines(line_ids, |line| line.status.can_fire());
        if qualifying.is_empty() {
            return Err(OrderError::NoQualifyingLines { action: "set course" });
        }

        Ok(vec![OrderEvent::CourseSet(CourseSetData {
            line_ids: qualifying,
            course,
        })])
    }

    /// Fires specific lines to the kitchen, clearing any holds on them.
    pub fn fire_items(
        &self,
        line_ids: &[LineId],
        fired_by: EmployeeId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("fire items")?;

        // Held lines qualify for an explicit fire; it releases the hold.
        let qualifying = self.qualifying_lines(line_ids, |line| line.status.can_fire());
        if qualifying.is_empty() {
            return Err(OrderError::NoQualifyingLines {
                action: "fire items",
            });
        }

        Ok(vec![OrderEvent::items_fired(qualifying, fired_by, None)])
    }

    /// Fires every pending line assigned to a course.
    pub fn fire_course(
        &self,
        course: u32,
        fired_by: EmployeeId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("fire course")?;

        let qualifying: Vec<LineId> = self
            .lines
            .iter()
            .filter(|line| line.status.can_fire() && line.course == Some(course))
            .map(|line| line.id)
            .collect();
        if qualifying.is_empty() {
            return Err(OrderError::NoQualifyingLines {
                action: "fire course",
            });
        }

        Ok(vec![OrderEvent::items_fired(
            qualifying,
            fired_by,
            Some(course),
        )])
    }

    /// Fires every pending line.
    pub fn fire_all(&self, fired_by: EmployeeId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("fire all")?;

        let qualifying: Vec<LineId> = self
            .lines
            .iter()
            .filter(|line| line.status.can_fire())
            .map(|line| line.id)
            .collect();
        if qualifying.is_empty() {
            return Err(OrderError::NoQualifyingLines { action: "fire all" });
        }

        Ok(vec![OrderEvent::items_fired(qualifying, fired_by, None)])
    }

    /// Assigns a line to a seat.
    pub fn assign_seat(&self, line_id: LineId, seat: u32) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("assign seat")?;
        let line = self.require_line(line_id)?;

        if seat == 0 {
            return Err(OrderError::InvalidSeat { seat });
        }
        if !line.is_active() {
            return Err(OrderError::LineNotEditable {
                line_id,
                status: line.status,
            });
        }

        Ok(vec![OrderEvent::SeatAssigned(SeatAssignedData {
            line_id,
            seat,
        })])
    }

    /// Applies a discount to a single line. The amount is capped at the
    /// line total when totals are computed.
    pub fn apply_line_discount(
        &self,
        line_id: LineId,
        kind: DiscountKind,
        reason: impl Into<String>,
        approved_by: Option<EmployeeId>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("apply line discount")?;
        let line = self.require_line(line_id)?;

        if !kind.is_valid() {
            return Err(OrderError::InvalidDiscount);
        }
        if !line.is_active() {
            return Err(OrderError::LineNotEditable {
                line_id,
                status: line.status,
            });
        }
        let reason = non_empty_reason(reason, "apply line discount")?;

        Ok(vec![OrderEvent::LineDiscountApplied(
            LineDiscountAppliedData {
                line_id,
                discount: LineDiscount {
                    kind,
                    reason,
                    approved_by,
                },
            },
        )])
    }

    /// Removes a line's discount.
    pub fn remove_line_discount(&self, line_id: LineId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("remove line discount")?;
        let line = self.require_line(line_id)?;

        if line.discount.is_none() {
            return Err(OrderError::NoLineDiscount { line_id });
        }

        Ok(vec![OrderEvent::LineDiscountRemoved(
            LineDiscountRemovedData { line_id },
        )])
    }

    /// Overrides a line's price. The original price is preserved on the
    /// first override only.
    pub fn override_price(
        &self,
        line_id: LineId,
        new_price: Money,
        reason: impl Into<String>,
        approved_by: Option<EmployeeId>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("override price")?;
        let line = self.require_line(line_id)?;

        if new_price.is_negative() {
            return Err(OrderError::InvalidPrice {
                cents: new_price.cents(),
            });
        }
        if !line.is_active() {
            return Err(OrderError::LineNotEditable {
                line_id,
                status: line.status,
            });
        }
        let reason = non_empty_reason(reason, "override price")?;

        let original_price = match &line.price_override {
            Some(existing) => existing.original_price,
            None => line.unit_price,
        };

        Ok(vec![OrderEvent::PriceOverridden(PriceOverriddenData {
            line_id,
            new_price,
            original_price,
            reason,
            approved_by,
        })])
    }

    /// Validates a split and returns copies of the lines to move.
    ///
    /// Used before creating the child order; `record_split` re-validates
    /// when the removal event is appended.
    pub fn lines_for_split(&self, line_ids: &[LineId]) -> Result<Vec<OrderLine>, OrderError> {
        self.validate_split(line_ids)?;
        Ok(line_ids
            .iter()
            .filter_map(|id| self.lines.get(id))
            .cloned()
            .collect())
    }

    /// Records that lines were moved to an already-created child order.
    pub fn record_split(
        &self,
        child_order_id: AggregateId,
        line_ids: &[LineId],
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.validate_split(line_ids)?;
        Ok(vec![OrderEvent::split_by_items(
            child_order_id,
            line_ids.to_vec(),
        )])
    }

    fn validate_split(&self, line_ids: &[LineId]) -> Result<(), OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("split")?;

        if line_ids.is_empty() {
            return Err(OrderError::EmptySplit);
        }
        for line_id in line_ids {
            let line = self.require_line(*line_id)?;
            if !line.is_active() {
                return Err(OrderError::LineNotEditable {
                    line_id: *line_id,
                    status: line.status,
                });
            }
        }
        // The split must be a strict subset of the active lines.
        if line_ids.len() >= self.lines.active_count() {
            return Err(OrderError::SplitLeavesOrderEmpty);
        }
        Ok(())
    }

    /// Absorbs another order's contents into this one.
    pub fn merge_in(&self, source: &Order) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        self.ensure_can_modify("merge")?;

        let source_id = source.id.ok_or(OrderError::NotCreated)?;
        if !source.status.can_merge_away() {
            return Err(OrderError::InvalidStateTransition {
                current_status: source.status,
                action: "merge source",
            });
        }

        Ok(vec![OrderEvent::MergedIn(MergedInData {
            source_order_id: source_id,
            lines: source.active_lines(),
            discounts: source.discounts.clone(),
            payments: source.payments.clone(),
            merged_at: Utc::now(),
        })])
    }

    /// Marks this order as absorbed into a target order. Permanently
    /// terminal; a merged-away order cannot be reopened.
    pub fn mark_merged(&self, target_order_id: AggregateId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.status.can_merge_away() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "merge away",
            });
        }

        Ok(vec![OrderEvent::merged_away(target_order_id)])
    }

    fn ensure_created(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotCreated);
        }
        Ok(())
    }

    fn ensure_can_modify(&self, action: &'static str) -> Result<(), OrderError> {
        if !self.status.can_modify() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action,
            });
        }
        Ok(())
    }

    fn require_line(&self, line_id: LineId) -> Result<&OrderLine, OrderError> {
        self.lines
            .get(&line_id)
            .ok_or(OrderError::LineNotFound { line_id })
    }

    /// Filters the requested ids down to existing lines passing `predicate`,
    /// in request order, deduplicated.
    fn qualifying_lines<F>(&self, line_ids: &[LineId], predicate: F) -> Vec<LineId>
    where
        F: Fn(&OrderLine) -> bool,
    {
        let mut seen = Vec::new();
        for line_id in line_ids {
            if seen.contains(line_id) {
                continue;
            }
            if let Some(line) = self.lines.get(line_id)
                && predicate(line)
            {
                seen.push(*line_id);
            }
        }
        seen
    }
}

// Apply event helpers
impl Order {
    fn apply_created(&mut self, data: CreatedData) {
        self.id = Some(data.order_id);
        self.organization_id = Some(data.organization_id);
        self.site_id = Some(data.site_id);
        self.order_number = data.order_number;
        self.kind = Some(data.kind);
        self.table = data.table;
        self.customer = data.customer;
        self.server = data.server;
        self.guest_count = data.guest_count;
        self.status = OrderStatus::Open;
        self.created_at = Some(data.created_at);
    }

    fn apply_created_from_split(&mut self, data: CreatedFromSplitData) {
        self.id = Some(data.order_id);
        self.organization_id = Some(data.organization_id);
        self.site_id = Some(data.site_id);
        self.order_number = data.order_number;
        self.kind = Some(data.kind);
        self.table = data.table;
        self.guest_count = 1;
        self.status = OrderStatus::Open;
        self.parent_order = Some(data.parent_order_id);
        self.created_at = Some(data.created_at);
        for line in data.lines {
            self.lines.insert(line);
        }
        self.recalculate();
    }

    fn apply_line_added(&mut self, data: LineAddedData) {
        self.lines.insert(data.line);
        self.recalculate();
    }

    fn apply_line_updated(&mut self, data: LineUpdatedData) {
        if let Some(line) = self.lines.get_mut(&data.line_id) {
            if let Some(quantity) = data.quantity {
                line.quantity = quantity;
            }
            if let Some(note) = data.note {
                line.note = Some(note);
            }
        }
        self.recalculate();
    }

    fn apply_line_voided(&mut self, data: LineVoidedData) {
        if let Some(line) = self.lines.get_mut(&data.line_id) {
            line.status = LineStatus::Voided;
            line.hold = None;
            line.void_info = Some(VoidInfo {
                voided_by: data.voided_by,
                reason: data.reason,
                voided_at: data.voided_at,
            });
        }
        self.recalculate();
    }

    fn apply_line_removed(&mut self, data: LineRemovedData) {
        self.lines.remove(&data.line_id);
        self.recalculate();
    }

    fn apply_sent(&mut self, data: SentData) {
        self.mark_lines_sent(&data.line_ids);
    }

    fn apply_discount_applied(&mut self, data: DiscountAppliedData) {
        self.discounts.push(data.discount);
        self.recalculate();
    }

    fn apply_discount_removed(&mut self, data: DiscountRemovedData) {
        self.discounts.retain(|d| d.id != data.discount_id);
        self.recalculate();
    }

    fn apply_service_charge_added(&mut self, data: ServiceChargeAddedData) {
        self.charges.push(data.charge);
        self.recalculate();
    }

    fn apply_customer_assigned(&mut self, data: CustomerAssignedData) {
        self.customer = Some(data.customer_id);
    }

    fn apply_server_assigned(&mut self, data: ServerAssignedData) {
        self.server = Some(data.server_id);
    }

    fn apply_table_transferred(&mut self, data: TableTransferredData) {
        self.table = Some(data.table);
    }

    fn apply_payment_recorded(&mut self, data: PaymentRecordedData) {
        self.payments.push(data.payment);
        self.recalculate();
    }

    fn apply_payment_removed(&mut self, data: PaymentRemovedData) {
        self.payments.retain(|p| p.id != data.payment_id);
        self.recalculate();
    }

    fn apply_closed(&mut self, data: super::events::ClosedData) {
        self.status = OrderStatus::Closed;
        self.closed_at = Some(data.closed_at);
        self.closed_by = Some(data.closed_by);
        self.business_date = Some(data.business_date);
    }

    fn apply_voided(&mut self, data: super::events::VoidedData) {
        self.status = OrderStatus::Voided;
        self.voided_at = Some(data.voided_at);
        self.voided_by = Some(data.voided_by);
        self.void_reason = Some(data.reason);
    }

    fn apply_reopened(&mut self) {
        self.closed_at = None;
        self.closed_by = None;
        self.business_date = None;
        self.voided_at = None;
        self.voided_by = None;
        self.void_reason = None;
        self.status = OrderStatus::Open;
        self.recalculate();
    }

    fn apply_items_held(&mut self, data: ItemsHeldData) {
        for line_id in &data.line_ids {
            if let Some(line) = self.lines.get_mut(line_id) {
                line.hold = Some(HoldInfo {
                    held_by: data.held_by,
                    reason: data.reason.clone(),
                    held_at: data.held_at,
                });
            }
        }
    }

    fn apply_items_released(&mut self, data: ItemsReleasedData) {
        for line_id in &data.line_ids {
            if let Some(line) = self.lines.get_mut(line_id) {
                line.hold = None;
            }
        }
    }

    fn apply_course_set(&mut self, data: CourseSetData) {
        for line_id in &data.line_ids {
            if let Some(line) = self.lines.get_mut(line_id) {
                line.course = Some(data.course);
            }
        }
    }

    fn apply_items_fired(&mut self, data: ItemsFiredData) {
        self.mark_lines_sent(&data.line_ids);
    }

    fn apply_seat_assigned(&mut self, data: SeatAssignedData) {
        if let Some(line) = self.lines.get_mut(&data.line_id) {
            line.seat = Some(data.seat);
        }
    }

    fn apply_line_discount_applied(&mut self, data: LineDiscountAppliedData) {
        if let Some(line) = self.lines.get_mut(&data.line_id) {
            line.discount = Some(data.discount);
        }
        self.recalculate();
    }

    fn apply_line_discount_removed(&mut self, data: LineDiscountRemovedData) {
        if let Some(line) = self.lines.get_mut(&data.line_id) {
            line.discount = None;
        }
        self.recalculate();
    }

    fn apply_price_overridden(&mut self, data: PriceOverriddenData) {
        if let Some(line) = self.lines.get_mut(&data.line_id) {
            line.unit_price = data.new_price;
            line.price_override = Some(PriceOverride {
                original_price: data.original_price,
                reason: data.reason,
                approved_by: data.approved_by,
            });
        }
        self.recalculate();
    }

    fn apply_split_by_items(&mut self, data: SplitByItemsData) {
        for line_id in &data.line_ids {
            self.lines.remove(line_id);
        }
        self.splits.push(SplitOrderReference {
            child_order_id: data.child_order_id,
            line_ids: data.line_ids,
            split_at: data.split_at,
        });
        self.recalculate();
    }

    fn apply_merged_in(&mut self, data: MergedInData) {
        for line in data.lines {
            self.lines.insert(line);
        }
        self.discounts.extend(data.discounts);
        self.payments.extend(data.payments);
        self.merged_sources.push(data.source_order_id);
        self.recalculate();
    }

    fn apply_merged_away(&mut self, data: super::events::MergedAwayData) {
        self.status = OrderStatus::MergedAway;
        self.merged_into = Some(data.target_order_id);
    }

    fn mark_lines_sent(&mut self, line_ids: &[LineId]) {
        for line_id in line_ids {
            if let Some(line) = self.lines.get_mut(line_id) {
                line.status = LineStatus::Sent;
                line.hold = None;
            }
        }
        self.refresh_status();
    }

    /// Recomputes totals from current contents and re-derives the
    /// payment-facet status.
    fn recalculate(&mut self) {
        self.totals =
            OrderTotals::calculate(&self.lines, &self.discounts, &self.charges, &self.payments);
        self.refresh_status();
    }

    fn refresh_status(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = if self.totals.paid.is_positive() {
            if self.totals.balance_due.is_positive() {
                OrderStatus::PartiallyPaid
            } else {
                OrderStatus::Paid
            }
        } else if self.lines.iter().any(|line| line.status == LineStatus::Sent) {
            OrderStatus::Sent
        } else {
            OrderStatus::Open
        };
    }
}


fn non_empty_reason(reason: impl Into<String>, action: &'static str) -> Result<String, OrderError> {
    let reason = reason.into();
    if reason.trim().is_empty() {
        return Err(OrderError::MissingReason { action });
    }
    Ok(reason)
}
