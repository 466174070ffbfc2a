//! Append-only, per-aggregate event log with optimistic concurrency.
//!
//! Each order aggregate owns an ordered sequence of immutable event records.
//! Appends either advance the aggregate version atomically or fail with a
//! [`EventStoreError::ConcurrencyConflict`]; state is always reconstructable
//! by replaying the full sequence.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::{AggregateId, OrgId};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt};
