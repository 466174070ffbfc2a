//! Saga error types.

use common::AggregateId;
use domain::{DomainError, ErrorCode, Money};
use thiserror::Error;

/// Errors that can occur during cross-order orchestration.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    /// Order is not in a state the orchestration can work with.
    #[error("Order not ready: {0}")]
    OrderNotReady(String),

    /// Merge endpoints belong to different sites.
    #[error("Orders belong to different sites: target {target}, source {source_id}")]
    SiteMismatch {
        target: AggregateId,
        source_id: AggregateId,
    },

    /// An order cannot be merged into itself.
    #[error("Cannot merge order {0} into itself")]
    MergeIntoSelf(AggregateId),

    /// The child order was created but the parent never recorded the split.
    /// The caller must void or re-attach the orphaned child.
    #[error(
        "Split partially applied: child {orphaned_child_id} exists but parent \
         {parent_order_id} did not record the split: {source}"
    )]
    PartialSplit {
        parent_order_id: AggregateId,
        orphaned_child_id: AggregateId,
        source: DomainError,
    },

    /// The target absorbed the source but the source was never marked
    /// merged. Retrying the merge would double the absorbed contents.
    #[error(
        "Merge partially applied: target {target_order_id} absorbed source \
         {source_order_id} but the source was not marked merged: {source}"
    )]
    PartialMerge {
        target_order_id: AggregateId,
        source_order_id: AggregateId,
        source: DomainError,
    },

    /// Share count must be positive.
    #[error("Share count must be at least 1, got {0}")]
    InvalidShareCount(u32),

    /// A requested share amount is negative.
    #[error("Share amounts must not be negative, got {0}")]
    NegativeShare(Money),

    /// Requested share amounts do not add up to the total.
    #[error("Share amounts sum to {actual}, expected {expected}")]
    ShareMismatch { expected: Money, actual: Money },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SagaError {
    /// Maps this error to its stable caller-facing code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SagaError::OrderNotFound(_) => ErrorCode::NotFound,
            SagaError::OrderNotReady(_) => ErrorCode::InvalidState,
            SagaError::SiteMismatch { .. } | SagaError::MergeIntoSelf(_) => {
                ErrorCode::InvalidArgument
            }
            SagaError::PartialSplit { .. } | SagaError::PartialMerge { .. } => {
                ErrorCode::PartialOrchestrationFailure
            }
            SagaError::InvalidShareCount(_)
            | SagaError::NegativeShare(_)
            | SagaError::ShareMismatch { .. } => ErrorCode::InvalidArgument,
            SagaError::Domain(e) => e.code(),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderError;

    #[test]
    fn test_partial_failures_carry_their_own_code() {
        let err = SagaError::PartialSplit {
            parent_order_id: AggregateId::new(),
            orphaned_child_id: AggregateId::new(),
            source: DomainError::Order(OrderError::NotCreated),
        };
        assert_eq!(err.code(), ErrorCode::PartialOrchestrationFailure);
    }

    #[test]
    fn test_domain_errors_pass_their_code_through() {
        let err = SagaError::Domain(DomainError::Order(OrderError::NoPendingLines));
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }
}
