//! End-to-end orchestration tests over the in-memory store.

use common::{AggregateId, OrgId, SiteId};
use domain::{
    CapturePublisher, DomainError, LineItemSpec, Money, OrderError, OrderKind, OrderOpening,
    OrderService, OrderStatus, PaymentId, PaymentMethod,
};
use event_store::InMemoryEventStore;
use saga::{SagaError, SplitMergeOrchestrator};

type Service = OrderService<InMemoryEventStore, CapturePublisher>;

fn service() -> Service {
    OrderService::with_publisher(InMemoryEventStore::new(), CapturePublisher::new())
}

async fn open_order(service: &Service, org: OrgId, site: SiteId, number: u64) -> AggregateId {
    let order_id = AggregateId::new();
    service
        .create_order(
            order_id,
            OrderOpening::new(org, site, number, OrderKind::DineIn, 2),
        )
        .await
        .unwrap();
    order_id
}

async fn add_item(service: &Service, order_id: AggregateId, name: &str, cents: i64) {
    service
        .add_line(
            order_id,
            LineItemSpec::new(
                format!("MENU-{name}"),
                name,
                1,
                Money::from_cents(cents),
                0.0,
            ),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn split_moves_lines_and_conserves_value() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());
    let org = OrgId::new();
    let site = SiteId::new();

    let parent_id = open_order(&service, org, site, 100).await;
    add_item(&service, parent_id, "Burger", 1200).await;
    add_item(&service, parent_id, "Fries", 500).await;
    add_item(&service, parent_id, "Soda", 300).await;

    let parent = service.get_order(parent_id).await.unwrap().unwrap();
    let total_before = parent.totals().grand_total;
    let split_ids: Vec<_> = parent
        .lines()
        .iter()
        .take(2)
        .map(|line| line.id)
        .collect();

    let child_id = orchestrator
        .split_by_items(parent_id, split_ids.clone(), 101)
        .await
        .unwrap();

    let parent = service.get_order(parent_id).await.unwrap().unwrap();
    let child = service.get_order(child_id).await.unwrap().unwrap();

    assert_eq!(parent.lines().len(), 1);
    assert_eq!(child.lines().len(), 2);
    assert_eq!(child.parent_order(), Some(parent_id));
    assert_eq!(child.order_number(), 101);
    assert_eq!(parent.splits().len(), 1);
    assert_eq!(parent.splits()[0].child_order_id, child_id);
    assert_eq!(parent.splits()[0].line_ids, split_ids);
    assert_eq!(
        parent.totals().grand_total + child.totals().grand_total,
        total_before
    );
}

#[tokio::test]
async fn split_of_every_line_is_rejected() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());

    let parent_id = open_order(&service, OrgId::new(), SiteId::new(), 100).await;
    add_item(&service, parent_id, "Burger", 1200).await;

    let parent = service.get_order(parent_id).await.unwrap().unwrap();
    let all_ids: Vec<_> = parent.lines().iter().map(|line| line.id).collect();

    let result = orchestrator.split_by_items(parent_id, all_ids, 101).await;
    assert!(matches!(
        result,
        Err(SagaError::Domain(DomainError::Order(
            OrderError::SplitLeavesOrderEmpty
        )))
    ));

    // Nothing was written for the rejected split.
    let parent = service.get_order(parent_id).await.unwrap().unwrap();
    assert_eq!(parent.lines().len(), 1);
    assert!(parent.splits().is_empty());
}

#[tokio::test]
async fn split_of_missing_order_is_not_found() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service);

    let result = orchestrator
        .split_by_items(AggregateId::new(), vec![], 101)
        .await;
    assert!(matches!(result, Err(SagaError::OrderNotFound(_))));
}

#[tokio::test]
async fn merge_absorbs_source_and_marks_it_away() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());
    let org = OrgId::new();
    let site = SiteId::new();

    let target_id = open_order(&service, org, site, 200).await;
    add_item(&service, target_id, "Steak", 3000).await;

    let source_id = open_order(&service, org, site, 201).await;
    add_item(&service, source_id, "Wine", 1500).await;
    service
        .record_payment(
            source_id,
            PaymentId::new(),
            Money::from_cents(500),
            Money::zero(),
            PaymentMethod::Cash,
        )
        .await
        .unwrap();

    let target = orchestrator.merge(target_id, source_id).await.unwrap();

    assert_eq!(target.lines().len(), 2);
    assert_eq!(target.totals().subtotal.cents(), 4500);
    assert_eq!(target.totals().paid.cents(), 500);
    assert_eq!(target.merged_sources(), &[source_id]);

    let source = service.get_order(source_id).await.unwrap().unwrap();
    assert_eq!(source.status(), OrderStatus::MergedAway);
    assert_eq!(source.merged_into(), Some(target_id));

    // Merged-away orders reject every further command.
    let result = service
        .record_payment(
            source_id,
            PaymentId::new(),
            Money::from_cents(100),
            Money::zero(),
            PaymentMethod::Cash,
        )
        .await;
    assert!(matches!(
        result,
        Err(DomainError::Order(OrderError::InvalidStateTransition { .. }))
    ));
}

#[tokio::test]
async fn merge_across_sites_is_rejected() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());
    let org = OrgId::new();

    let target_id = open_order(&service, org, SiteId::new(), 200).await;
    let source_id = open_order(&service, org, SiteId::new(), 201).await;

    let result = orchestrator.merge(target_id, source_id).await;
    assert!(matches!(result, Err(SagaError::SiteMismatch { .. })));
}

#[tokio::test]
async fn merge_into_self_is_rejected() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());
    let order_id = open_order(&service, OrgId::new(), SiteId::new(), 200).await;

    let result = orchestrator.merge(order_id, order_id).await;
    assert!(matches!(result, Err(SagaError::MergeIntoSelf(_))));
}

#[tokio::test]
async fn merge_of_voided_source_is_rejected() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());
    let org = OrgId::new();
    let site = SiteId::new();

    let target_id = open_order(&service, org, site, 200).await;
    let source_id = open_order(&service, org, site, 201).await;
    service
        .void_order(
            source_id,
            domain::EmployeeId::new(),
            "Duplicate ticket".to_string(),
            false,
        )
        .await
        .unwrap();

    let result = orchestrator.merge(target_id, source_id).await;
    assert!(matches!(result, Err(SagaError::OrderNotReady(_))));
}

async fn add_taxed_item(
    service: &Service,
    order_id: AggregateId,
    name: &str,
    cents: i64,
    tax_rate: f64,
) {
    service
        .add_line(
            order_id,
            LineItemSpec::new(
                format!("MENU-{name}"),
                name,
                1,
                Money::from_cents(cents),
                tax_rate,
            ),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn shares_by_people_split_the_outstanding_balance() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());

    let order_id = open_order(&service, OrgId::new(), SiteId::new(), 300).await;
    // 20.00 at 10% tax: grand 22.00. Half is paid, 11.00 remains.
    add_taxed_item(&service, order_id, "Platter", 2000, 10.0).await;
    service
        .record_payment(
            order_id,
            PaymentId::new(),
            Money::from_cents(1100),
            Money::zero(),
            PaymentMethod::Cash,
        )
        .await
        .unwrap();

    let shares = orchestrator.shares_by_people(order_id, 3).await.unwrap();

    let balance = service
        .get_order(order_id)
        .await
        .unwrap()
        .unwrap()
        .totals()
        .balance_due;
    let total: Money = shares.iter().map(|s| s.total).sum();
    assert_eq!(total, balance);

    // 11.00 over 3 shares: the first carries the rounding remainder, and
    // the remaining tax (1.00 of the original 2.00) splits the same way.
    assert_eq!(shares[0].total.cents(), 368);
    assert_eq!(shares[1].total.cents(), 366);
    assert_eq!(shares[2].total.cents(), 366);
    let tax: Money = shares.iter().map(|s| s.tax).sum();
    assert_eq!(tax.cents(), 100);
    for share in &shares {
        assert_eq!(share.subtotal + share.tax, share.total);
    }
}

#[tokio::test]
async fn shares_by_amounts_must_match_the_balance_due() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());

    let order_id = open_order(&service, OrgId::new(), SiteId::new(), 301).await;
    add_taxed_item(&service, order_id, "Platter", 2000, 10.0).await;

    // Balance due is 22.00; these amounts leave 2.00 unaccounted for.
    let result = orchestrator
        .shares_by_amounts(order_id, &[Money::from_cents(1000), Money::from_cents(1000)])
        .await;
    assert!(matches!(result, Err(SagaError::ShareMismatch { .. })));

    let shares = orchestrator
        .shares_by_amounts(order_id, &[Money::from_cents(1000), Money::from_cents(1200)])
        .await
        .unwrap();
    let total: Money = shares.iter().map(|s| s.total).sum();
    let tax: Money = shares.iter().map(|s| s.tax).sum();
    assert_eq!(total.cents(), 2200);
    assert_eq!(tax.cents(), 200);
    for share in &shares {
        assert_eq!(share.subtotal + share.tax, share.total);
    }
}

#[tokio::test]
async fn shares_on_settled_order_are_rejected() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());

    let order_id = open_order(&service, OrgId::new(), SiteId::new(), 302).await;
    add_item(&service, order_id, "Coffee", 400).await;
    service
        .record_payment(
            order_id,
            PaymentId::new(),
            Money::from_cents(400),
            Money::zero(),
            PaymentMethod::Card,
        )
        .await
        .unwrap();

    let result = orchestrator.shares_by_people(order_id, 2).await;
    assert!(matches!(result, Err(SagaError::OrderNotReady(_))));
}

#[tokio::test]
async fn split_then_merge_round_trip_restores_contents() {
    let service = service();
    let orchestrator = SplitMergeOrchestrator::new(service.clone());
    let org = OrgId::new();
    let site = SiteId::new();

    let parent_id = open_order(&service, org, site, 100).await;
    add_item(&service, parent_id, "Burger", 1200).await;
    add_item(&service, parent_id, "Fries", 500).await;

    let parent = service.get_order(parent_id).await.unwrap().unwrap();
    let split_ids: Vec<_> = parent
        .lines()
        .iter()
        .take(1)
        .map(|line| line.id)
        .collect();

    let child_id = orchestrator
        .split_by_items(parent_id, split_ids, 101)
        .await
        .unwrap();
    let merged = orchestrator.merge(parent_id, child_id).await.unwrap();

    assert_eq!(merged.lines().len(), 2);
    assert_eq!(merged.totals().subtotal.cents(), 1700);
}
