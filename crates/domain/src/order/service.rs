//! Application service for the order aggregate.
//!
//! Every command goes through the per-order mailbox, so two commands for
//! the same order never interleave and the optimistic-concurrency check in
//! the store only fires across process boundaries. Notifications are
//! published after the append succeeds; a publish failure is logged and
//! never rolls the events back.

use std::sync::Arc;

use chrono::NaiveDate;
use common::{AggregateId, OrgId, SiteId};
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::CommandHandler;
use crate::error::DomainError;
use crate::mailbox::CommandMailbox;

use super::publish::{LoggingPublisher, Notification, OrderPublisher};
use super::{
    CustomerId, DiscountId, DiscountKind, EmployeeId, LineId, LineItemSpec, Money, Order,
    OrderError, OrderEvent, OrderKind, OrderLine, OrderOpening, PaymentId, PaymentMethod, TableId,
};

pub struct OrderService<S, P = LoggingPublisher>
where
    S: EventStore,
    P: OrderPublisher,
{
    handler: Arc<CommandHandler<S, Order>>,
    mailbox: CommandMailbox,
    publisher: Arc<P>,
}

impl<S, P> Clone for OrderService<S, P>
where
    S: EventStore,
    P: OrderPublisher,
{
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            mailbox: self.mailbox.clone(),
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<S> OrderService<S, LoggingPublisher>
where
    S: EventStore + 'static,
{
    pub fn new(store: S) -> Self {
        Self::with_publisher(store, LoggingPublisher)
    }
}

impl<S, P> OrderService<S, P>
where
    S: EventStore + 'static,
    P: OrderPublisher + 'static,
{
    pub fn with_publisher(store: S, publisher: P) -> Self {
        Self {
            handler: Arc::new(CommandHandler::new(store)),
            mailbox: CommandMailbox::new(),
            publisher: Arc::new(publisher),
        }
    }

    /// Loads an order, returning None if no events exist for the id.
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    #[tracing::instrument(skip(self, opening), fields(order_id = %order_id))]
    pub async fn create_order(
        &self,
        order_id: AggregateId,
        opening: OrderOpening,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "create_order", move |order| {
            order.create(order_id, opening)
        })
        .await
    }

    /// Creates a child order seeded with lines moved out of a parent.
    #[tracing::instrument(skip(self, lines), fields(order_id = %order_id, parent = %parent_order_id))]
    #[allow(clippy::too_many_arguments)]
    pub async fn create_order_from_split(
        &self,
        order_id: AggregateId,
        organization_id: OrgId,
        site_id: SiteId,
        order_number: u64,
        kind: OrderKind,
        table: Option<TableId>,
        parent_order_id: AggregateId,
        lines: Vec<OrderLine>,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "create_order_from_split", move |order| {
            order.create_from_split(
                order_id,
                organization_id,
                site_id,
                order_number,
                kind,
                table,
                parent_order_id,
                lines,
            )
        })
        .await
    }

    #[tracing::instrument(skip(self, spec), fields(order_id = %order_id))]
    pub async fn add_line(
        &self,
        order_id: AggregateId,
        spec: LineItemSpec,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "add_line", move |order| order.add_line(spec))
            .await
    }

    #[tracing::instrument(skip(self, note), fields(order_id = %order_id))]
    pub async fn update_line(
        &self,
        order_id: AggregateId,
        line_id: LineId,
        quantity: Option<u32>,
        note: Option<String>,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "update_line", move |order| {
            order.update_line(line_id, quantity, note)
        })
        .await
    }

    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn void_line(
        &self,
        order_id: AggregateId,
        line_id: LineId,
        voided_by: EmployeeId,
        reason: String,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "void_line", move |order| {
            order.void_line(line_id, voided_by, reason)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn remove_line(
        &self,
        order_id: AggregateId,
        line_id: LineId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "remove_line", move |order| {
            order.remove_line(line_id)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn send_order(
        &self,
        order_id: AggregateId,
        sent_by: EmployeeId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "send_order", move |order| order.send(sent_by))
            .await
    }

    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn apply_discount(
        &self,
        order_id: AggregateId,
        kind: DiscountKind,
        reason: String,
        approved_by: Option<EmployeeId>,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "apply_discount", move |order| {
            order.apply_discount(kind, reason, approved_by)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn remove_discount(
        &self,
        order_id: AggregateId,
        discount_id: DiscountId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "remove_discount", move |order| {
            order.remove_discount(discount_id)
        })
        .await
    }

    #[tracing::instrument(skip(self, name), fields(order_id = %order_id))]
    pub async fn add_service_charge(
        &self,
        order_id: AggregateId,
        name: String,
        rate: f64,
        taxable: bool,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "add_service_charge", move |order| {
            order.add_service_charge(name, rate, taxable)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn assign_customer(
        &self,
        order_id: AggregateId,
        customer_id: CustomerId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "assign_customer", move |order| {
            order.assign_customer(customer_id)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn assign_server(
        &self,
        order_id: AggregateId,
        server_id: EmployeeId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "assign_server", move |order| {
            order.assign_server(server_id)
        })
        .await
    }

    #[tracing::instrument(skip(self, table), fields(order_id = %order_id))]
    pub async fn transfer_table(
        &self,
        order_id: AggregateId,
        table: TableId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "transfer_table", move |order| {
            order.transfer_table(table)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn record_payment(
        &self,
        order_id: AggregateId,
        payment_id: PaymentId,
        amount: Money,
        tip: Money,
        method: PaymentMethod,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "record_payment", move |order| {
            order.record_payment(payment_id, amount, tip, method)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn remove_payment(
        &self,
        order_id: AggregateId,
        payment_id: PaymentId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "remove_payment", move |order| {
            order.remove_payment(payment_id)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn close_order(
        &self,
        order_id: AggregateId,
        closed_by: EmployeeId,
        business_date: NaiveDate,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "close_order", move |order| {
            order.close(closed_by, business_date)
        })
        .await
    }

    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn void_order(
        &self,
        order_id: AggregateId,
        voided_by: EmployeeId,
        reason: String,
        reverse_inventory: bool,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "void_order", move |order| {
            order.void(voided_by, reason, reverse_inventory)
        })
        .await
    }

    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn reopen_order(
        &self,
        order_id: AggregateId,
        reopened_by: EmployeeId,
        reason: String,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "reopen_order", move |order| {
            order.reopen(reopened_by, reason)
        })
        .await
    }

    #[tracing::instrument(skip(self, line_ids, reason), fields(order_id = %order_id))]
    pub async fn hold_items(
        &self,
        order_id: AggregateId,
        line_ids: Vec<LineId>,
        held_by: EmployeeId,
        reason: String,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "hold_items", move |order| {
            order.hold_items(&line_ids, held_by, reason)
        })
        .await
    }

    #[tracing::instrument(skip(self, line_ids), fields(order_id = %order_id))]
    pub async fn release_items(
        &self,
        order_id: AggregateId,
        line_ids: Vec<LineId>,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "release_items", move |order| {
            order.release_items(&line_ids)
        })
        .await
    }

    #[tracing::instrument(skip(self, line_ids), fields(order_id = %order_id))]
    pub async fn set_item_course(
        &self,
        order_id: AggregateId,
        line_ids: Vec<LineId>,
        course: u32,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "set_item_course", move |order| {
            order.set_item_course(&line_ids, course)
        })
        .await
    }

    #[tracing::instrument(skip(self, line_ids), fields(order_id = %order_id))]
    pub async fn fire_items(
        &self,
        order_id: AggregateId,
        line_ids: Vec<LineId>,
        fired_by: EmployeeId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "fire_items", move |order| {
            order.fire_items(&line_ids, fired_by)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn fire_course(
        &self,
        order_id: AggregateId,
        course: u32,
        fired_by: EmployeeId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "fire_course", move |order| {
            order.fire_course(course, fired_by)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn fire_all(
        &self,
        order_id: AggregateId,
        fired_by: EmployeeId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "fire_all", move |order| order.fire_all(fired_by))
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn assign_seat(
        &self,
        order_id: AggregateId,
        line_id: LineId,
        seat: u32,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "assign_seat", move |order| {
            order.assign_seat(line_id, seat)
        })
        .await
    }

    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn apply_line_discount(
        &self,
        order_id: AggregateId,
        line_id: LineId,
        kind: DiscountKind,
        reason: String,
        approved_by: Option<EmployeeId>,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "apply_line_discount", move |order| {
            order.apply_line_discount(line_id, kind, reason, approved_by)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn remove_line_discount(
        &self,
        order_id: AggregateId,
        line_id: LineId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "remove_line_discount", move |order| {
            order.remove_line_discount(line_id)
        })
        .await
    }

    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn override_price(
        &self,
        order_id: AggregateId,
        line_id: LineId,
        new_price: Money,
        reason: String,
        approved_by: Option<EmployeeId>,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "override_price", move |order| {
            order.override_price(line_id, new_price, reason, approved_by)
        })
        .await
    }

    /// Records that lines were moved to an already-created child order.
    #[tracing::instrument(skip(self, line_ids), fields(order_id = %order_id, child = %child_order_id))]
    pub async fn record_split(
        &self,
        order_id: AggregateId,
        child_order_id: AggregateId,
        line_ids: Vec<LineId>,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "record_split", move |order| {
            order.record_split(child_order_id, &line_ids)
        })
        .await
    }

    /// Absorbs a source order's contents into the target order.
    #[tracing::instrument(skip(self, source), fields(order_id = %order_id))]
    pub async fn merge_in(
        &self,
        order_id: AggregateId,
        source: Order,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "merge_in", move |order| order.merge_in(&source))
            .await
    }

    /// Marks a source order as absorbed into a target order.
    #[tracing::instrument(skip(self), fields(order_id = %order_id, target = %target_order_id))]
    pub async fn mark_merged(
        &self,
        order_id: AggregateId,
        target_order_id: AggregateId,
    ) -> Result<Order, DomainError> {
        self.run_command(order_id, "mark_merged", move |order| {
            order.mark_merged(target_order_id)
        })
        .await
    }

    async fn run_command<F>(
        &self,
        order_id: AggregateId,
        command: &'static str,
        command_fn: F,
    ) -> Result<Order, DomainError>
    where
        F: FnOnce(&Order) -> Result<Vec<OrderEvent>, OrderError> + Send + 'static,
    {
        let handler = Arc::clone(&self.handler);
        let publisher = Arc::clone(&self.publisher);

        self.mailbox
            .run(order_id, async move {
                let result = handler.execute_with_snapshot(order_id, command_fn).await?;

                metrics::counter!("order_commands_total", "command" => command).increment(1);
                metrics::counter!("order_events_total").increment(result.events.len() as u64);

                for notification in notifications_for(&result.aggregate, order_id, &result.events) {
                    if let Err(error) = publisher.publish(notification).await {
                        tracing::warn!(
                            order_id = %order_id,
                            command,
                            error = %error,
                            "Failed to publish order notification"
                        );
                    }
                }

                Ok::<Order, DomainError>(result.aggregate)
            })
            .await?
    }
}

/// Maps persisted events to downstream notifications.
///
/// `order` is the aggregate after the events were applied; it supplies the
/// context (totals, line snapshots) the events themselves do not carry.
fn notifications_for(
    order: &Order,
    order_id: AggregateId,
    events: &[OrderEvent],
) -> Vec<Notification> {
    let Some(organization_id) = order.organization_id() else {
        return vec![];
    };

    let mut notifications = Vec::new();
    for event in events {
        match event {
            OrderEvent::Created(data) => notifications.push(Notification::OrderCreated {
                organization_id,
                order_id,
                order_number: data.order_number,
            }),
            OrderEvent::CreatedFromSplit(data) => notifications.push(Notification::OrderCreated {
                organization_id,
                order_id,
                order_number: data.order_number,
            }),
            OrderEvent::LineAdded(data) => notifications.push(Notification::OrderLineAdded {
                organization_id,
                order_id,
                line: data.line.clone(),
            }),
            OrderEvent::Sent(data) => notifications.push(Notification::OrderSentToKitchen {
                organization_id,
                order_id,
                line_ids: data.line_ids.clone(),
            }),
            OrderEvent::ItemsFired(data) => notifications.push(Notification::ItemsFiredToKitchen {
                organization_id,
                order_id,
                line_ids: data.line_ids.clone(),
                course: data.course,
            }),
            // The kitchen only cares about voids for lines it has seen.
            OrderEvent::LineVoided(data) if data.was_sent => {
                notifications.push(Notification::KitchenItemVoided {
                    organization_id,
                    order_id,
                    line_id: data.line_id,
                    reason: data.reason.clone(),
                })
            }
            OrderEvent::Closed(data) => notifications.push(Notification::OrderCompleted {
                organization_id,
                order_id,
                order_number: order.order_number(),
                business_date: data.business_date,
                customer: order.customer(),
                server: order.server(),
                lines: order.active_lines(),
                totals: *order.totals(),
            }),
            OrderEvent::Voided(data) => notifications.push(Notification::OrderVoided {
                organization_id,
                order_id,
                reason: data.reason.clone(),
                reversed_lines: data
                    .reverse_inventory
                    .then(|| order.active_lines()),
            }),
            OrderEvent::MergedIn(data) => notifications.push(Notification::OrdersMerged {
                organization_id,
                target_order_id: order_id,
                source_order_id: data.source_order_id,
            }),
            _ => {}
        }
    }
    notifications
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::publish::CapturePublisher;
    use event_store::InMemoryEventStore;

    fn service() -> OrderService<InMemoryEventStore, CapturePublisher> {
        OrderService::with_publisher(InMemoryEventStore::new(), CapturePublisher::new())
    }

    fn opening() -> OrderOpening {
        OrderOpening::new(OrgId::new(), SiteId::new(), 42, OrderKind::DineIn, 2)
    }

    fn burger() -> LineItemSpec {
        LineItemSpec::new("MENU-001", "Burger", 2, Money::from_cents(1000), 10.0)
    }

    #[tokio::test]
    async fn test_create_and_reload_order() {
        let service = service();
        let order_id = AggregateId::new();

        let order = service.create_order(order_id, opening()).await.unwrap();
        assert_eq!(order.order_number(), 42);

        let reloaded = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(reloaded.order_number(), 42);
        assert_eq!(reloaded.version(), order.version());
    }

    #[tokio::test]
    async fn test_get_missing_order_returns_none() {
        let service = service();
        let result = service.get_order(AggregateId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_rejected_command_appends_nothing() {
        let store = InMemoryEventStore::new();
        let service =
            OrderService::with_publisher(store.clone(), CapturePublisher::new());
        let order_id = AggregateId::new();
        service.create_order(order_id, opening()).await.unwrap();
        let count_before = store.event_count().await;

        let mut bad = burger();
        bad.quantity = 0;
        let result = service.add_line(order_id, bad).await;

        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::InvalidQuantity { .. }))
        ));
        assert_eq!(store.event_count().await, count_before);
    }

    #[tokio::test]
    async fn test_kitchen_notifications_flow() {
        let publisher = CapturePublisher::new();
        let service =
            OrderService::with_publisher(InMemoryEventStore::new(), publisher.clone());
        let order_id = AggregateId::new();
        let server = EmployeeId::new();

        service.create_order(order_id, opening()).await.unwrap();
        let order = service.add_line(order_id, burger()).await.unwrap();
        let line_id = order.lines().iter().next().map(|l| l.id).unwrap();
        service.send_order(order_id, server).await.unwrap();
        service
            .void_line(order_id, line_id, server, "86'd".to_string())
            .await
            .unwrap();

        let kinds: Vec<&str> = publisher.take().iter().map(|n| n.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "OrderCreated",
                "OrderLineAdded",
                "OrderSentToKitchen",
                "KitchenItemVoided"
            ]
        );
    }

    #[tokio::test]
    async fn test_pre_send_void_is_not_sent_to_kitchen() {
        let publisher = CapturePublisher::new();
        let service =
            OrderService::with_publisher(InMemoryEventStore::new(), publisher.clone());
        let order_id = AggregateId::new();

        service.create_order(order_id, opening()).await.unwrap();
        let order = service.add_line(order_id, burger()).await.unwrap();
        let line_id = order.lines().iter().next().map(|l| l.id).unwrap();
        service
            .void_line(order_id, line_id, EmployeeId::new(), "Typo".to_string())
            .await
            .unwrap();

        let kinds: Vec<&str> = publisher.take().iter().map(|n| n.kind()).collect();
        assert!(!kinds.contains(&"KitchenItemVoided"));
    }

    #[tokio::test]
    async fn test_close_publishes_completion_summary() {
        let publisher = CapturePublisher::new();
        let service =
            OrderService::with_publisher(InMemoryEventStore::new(), publisher.clone());
        let order_id = AggregateId::new();
        let business_date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        service.create_order(order_id, opening()).await.unwrap();
        service.add_line(order_id, burger()).await.unwrap();
        service
            .record_payment(
                order_id,
                PaymentId::new(),
                Money::from_cents(2200),
                Money::from_cents(400),
                PaymentMethod::Card,
            )
            .await
            .unwrap();
        service
            .close_order(order_id, EmployeeId::new(), business_date)
            .await
            .unwrap();

        let completed = publisher
            .take()
            .into_iter()
            .find(|n| n.kind() == "OrderCompleted");
        match completed {
            Some(Notification::OrderCompleted {
                business_date: date,
                lines,
                totals,
                ..
            }) => {
                assert_eq!(date, business_date);
                assert_eq!(lines.len(), 1);
                assert_eq!(totals.tip_total.cents(), 400);
            }
            other => panic!("Expected OrderCompleted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_commands_on_same_order_all_apply() {
        let service = service();
        let order_id = AggregateId::new();
        service.create_order(order_id, opening()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .add_line(
                        order_id,
                        LineItemSpec::new(
                            format!("MENU-{i:03}"),
                            format!("Item {i}"),
                            1,
                            Money::from_cents(100),
                            0.0,
                        ),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.lines().len(), 8);
        assert_eq!(order.totals().subtotal.cents(), 800);
    }
}
