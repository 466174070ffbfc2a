//! Cross-order orchestration: splits, merges, and payment shares.
//!
//! Each order aggregate is its own consistency boundary, so operations
//! that span two orders run as explicit two-step orchestrations with
//! partial-failure reporting rather than distributed transactions.

pub mod error;
pub mod orchestrator;
pub mod shares;

pub use error::{Result, SagaError};
pub use orchestrator::SplitMergeOrchestrator;
pub use shares::{PaymentShare, remaining_to_collect, split_by_amounts, split_evenly};
