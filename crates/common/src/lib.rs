//! Shared identifier types for the POS order core.

pub mod types;

pub use types::{AggregateId, OrgId, SiteId};
