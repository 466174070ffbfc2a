//! Domain error types and the stable error-code taxonomy.

use event_store::EventStoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::OrderError;

/// Stable, caller-facing error codes.
///
/// Every failure crossing the aggregate boundary maps to exactly one code
/// plus a human-readable reason; internal detail never leaks past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Order, line, discount, or payment does not exist.
    NotFound,
    /// Creation attempted against an aggregate that already exists.
    AlreadyExists,
    /// Caller supplied bad data; rejected before any event was raised.
    InvalidArgument,
    /// Operation not legal in the current status; rejected before any event.
    InvalidState,
    /// Infrastructure-level write race, surfaced for retry.
    VersionConflict,
    /// A cross-aggregate orchestration completed its first step but failed
    /// its second; the caller must compensate.
    PartialOrchestrationFailure,
    /// Storage or serialization failure.
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::VersionConflict => "VERSION_CONFLICT",
            ErrorCode::PartialOrchestrationFailure => "PARTIAL_ORCHESTRATION_FAILURE",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{}", name)
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A command was rejected by the order aggregate.
    #[error("Order error: {0}")]
    Order(OrderError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The per-aggregate command worker stopped before replying.
    #[error("Command worker for aggregate {0} stopped unexpectedly")]
    WorkerStopped(common::AggregateId),
}

impl DomainError {
    /// Maps this error to its stable caller-facing code.
    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
                ErrorCode::VersionConflict
            }
            DomainError::EventStore(EventStoreError::AggregateNotFound(_)) => ErrorCode::NotFound,
            DomainError::EventStore(_) => ErrorCode::Internal,
            DomainError::Order(e) => e.code(),
            DomainError::AggregateNotFound { .. } => ErrorCode::NotFound,
            DomainError::Serialization(_) => ErrorCode::Internal,
            DomainError::WorkerStopped(_) => ErrorCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;
    use event_store::Version;

    #[test]
    fn version_conflict_maps_to_retryable_code() {
        let err = DomainError::EventStore(EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::new(3),
            actual: Version::new(4),
        });
        assert_eq!(err.code(), ErrorCode::VersionConflict);
    }

    #[test]
    fn missing_aggregate_maps_to_not_found() {
        let err = DomainError::AggregateNotFound {
            aggregate_type: "Order",
            aggregate_id: "abc".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn code_display_is_screaming_snake() {
        assert_eq!(ErrorCode::InvalidState.to_string(), "INVALID_STATE");
        assert_eq!(
            ErrorCode::PartialOrchestrationFailure.to_string(),
            "PARTIAL_ORCHESTRATION_FAILURE"
        );
    }
}
