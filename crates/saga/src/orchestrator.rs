//! Two-step orchestrations across order aggregates.
//!
//! Splits and merges touch two orders, and the store only guarantees
//! atomicity per aggregate. Each orchestration is ordered so the first
//! step is safe on its own; when the second step fails, the error names
//! the aggregate left behind so the caller can compensate.

use common::AggregateId;
use domain::{Aggregate, LineId, Money, Order, OrderPublisher, OrderService};
use event_store::EventStore;

use crate::error::{Result, SagaError};
use crate::shares::{self, PaymentShare};

/// Orchestrates order splits and merges.
pub struct SplitMergeOrchestrator<S, P>
where
    S: EventStore,
    P: OrderPublisher,
{
    orders: OrderService<S, P>,
}

impl<S, P> SplitMergeOrchestrator<S, P>
where
    S: EventStore + 'static,
    P: OrderPublisher + 'static,
{
    pub fn new(orders: OrderService<S, P>) -> Self {
        Self { orders }
    }

    /// Moves a strict subset of a parent order's lines onto a new child
    /// order, returning the child's id.
    ///
    /// Step 1 creates the child, step 2 removes the lines from the parent.
    /// The steps are not atomic: if step 2 fails, the child exists while
    /// the parent still carries the lines, and the error surfaces the
    /// orphaned child id.
    #[tracing::instrument(skip(self, line_ids), fields(parent = %parent_order_id))]
    pub async fn split_by_items(
        &self,
        parent_order_id: AggregateId,
        line_ids: Vec<LineId>,
        child_order_number: u64,
    ) -> Result<AggregateId> {
        metrics::counter!("saga_splits_total").increment(1);

        let parent = self
            .orders
            .get_order(parent_order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(parent_order_id))?;

        let organization_id = parent
            .organization_id()
            .ok_or(SagaError::OrderNotFound(parent_order_id))?;
        let site_id = parent
            .site_id()
            .ok_or(SagaError::OrderNotFound(parent_order_id))?;
        let kind = parent
            .kind()
            .ok_or(SagaError::OrderNotFound(parent_order_id))?;

        // Validates existence, line eligibility, and the strict-subset rule
        // before anything is written.
        let moved_lines = parent
            .lines_for_split(&line_ids)
            .map_err(domain::DomainError::from)?;

        let child_order_id = AggregateId::new();
        self.orders
            .create_order_from_split(
                child_order_id,
                organization_id,
                site_id,
                child_order_number,
                kind,
                parent.table().cloned(),
                parent_order_id,
                moved_lines,
            )
            .await?;

        if let Err(error) = self
            .orders
            .record_split(parent_order_id, child_order_id, line_ids)
            .await
        {
            metrics::counter!("saga_partial_failures_total", "saga" => "split").increment(1);
            tracing::error!(
                parent = %parent_order_id,
                child = %child_order_id,
                error = %error,
                "Split child created but parent failed to record the split"
            );
            return Err(SagaError::PartialSplit {
                parent_order_id,
                orphaned_child_id: child_order_id,
                source: error,
            });
        }

        tracing::info!(
            parent = %parent_order_id,
            child = %child_order_id,
            "Order split completed"
        );
        Ok(child_order_id)
    }

    /// Absorbs the source order into the target order, returning the
    /// target after the merge.
    ///
    /// Step 1 copies the source's active lines, discounts, and payments
    /// onto the target; step 2 marks the source merged away. If step 2
    /// fails the source is still live and re-running the merge would
    /// duplicate its contents, so the error surfaces both ids instead of
    /// retrying.
    #[tracing::instrument(skip(self), fields(target = %target_order_id, source = %source_order_id))]
    pub async fn merge(
        &self,
        target_order_id: AggregateId,
        source_order_id: AggregateId,
    ) -> Result<Order> {
        metrics::counter!("saga_merges_total").increment(1);

        if target_order_id == source_order_id {
            return Err(SagaError::MergeIntoSelf(target_order_id));
        }

        let target = self
            .orders
            .get_order(target_order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(target_order_id))?;
        let source = self
            .orders
            .get_order(source_order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(source_order_id))?;

        if target.site_id() != source.site_id() {
            return Err(SagaError::SiteMismatch {
                target: target_order_id,
                source_id: source_order_id,
            });
        }
        if !target.status().can_modify() {
            return Err(SagaError::OrderNotReady(format!(
                "Target order is {}",
                target.status()
            )));
        }
        if !source.status().can_merge_away() {
            return Err(SagaError::OrderNotReady(format!(
                "Source order is {}",
                source.status()
            )));
        }

        let merged_target = self.orders.merge_in(target_order_id, source).await?;

        if let Err(error) = self
            .orders
            .mark_merged(source_order_id, target_order_id)
            .await
        {
            metrics::counter!("saga_partial_failures_total", "saga" => "merge").increment(1);
            tracing::error!(
                target = %target_order_id,
                source = %source_order_id,
                error = %error,
                "Target absorbed source but source failed to mark merged"
            );
            return Err(SagaError::PartialMerge {
                target_order_id,
                source_order_id,
                source: error,
            });
        }

        tracing::info!(
            target = %target_order_id,
            source = %source_order_id,
            "Order merge completed"
        );
        Ok(merged_target)
    }

    /// Computes `count` even shares of the order's outstanding balance.
    ///
    /// Calculation only: no events are written. The shares are anchored to
    /// the order's live balance due, so callers can present them and then
    /// record ordinary payments against the order.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn shares_by_people(
        &self,
        order_id: AggregateId,
        count: u32,
    ) -> Result<Vec<PaymentShare>> {
        let (balance, tax) = self.remaining_balance(order_id).await?;
        shares::split_evenly(balance, tax, count)
    }

    /// Validates caller-chosen amounts against the order's outstanding
    /// balance and decomposes each into a share.
    ///
    /// Calculation only, like [`Self::shares_by_people`]. The amounts must
    /// sum to the balance due within one cent.
    #[tracing::instrument(skip(self, amounts), fields(order_id = %order_id))]
    pub async fn shares_by_amounts(
        &self,
        order_id: AggregateId,
        amounts: &[Money],
    ) -> Result<Vec<PaymentShare>> {
        let (balance, tax) = self.remaining_balance(order_id).await?;
        shares::split_by_amounts(balance, tax, amounts)
    }

    async fn remaining_balance(&self, order_id: AggregateId) -> Result<(Money, Money)> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;
        shares::remaining_to_collect(order.totals())
    }
}
