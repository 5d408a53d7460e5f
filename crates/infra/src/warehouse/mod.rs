//! In-memory warehouse: the planner's collaborator for stock and order records.
//!
//! ## Design
//!
//! - One shared [`WarehouseState`] behind a `RwLock`
//! - Units of work run inside a [`WarehouseTransaction`]: a staged copy taken
//!   from a consistent view, committed by merging only the records it touched
//! - Order writes go through the `ReplenishmentOrder` aggregate and are
//!   journaled as event envelopes
//! - Touched orders are version-checked at commit (optimistic concurrency)

mod snapshot;
mod state;
mod store;
mod transaction;

pub use snapshot::WarehouseSnapshot;
pub use state::{PolicyFilter, WarehouseState};
pub use store::InMemoryWarehouse;
pub use transaction::{Savepoint, WarehouseTransaction};

use thiserror::Error;

use replenish_core::DomainError;
use replenish_planning::PlanningError;
use replenish_stock::OrderId;

/// Aggregate type recorded on journaled order events.
pub const ORDER_AGGREGATE_TYPE: &str = "procurement.order";

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Another unit of work committed a change to the same order first.
    #[error("order {order} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        order: OrderId,
        expected: u64,
        actual: u64,
    },

    #[error("warehouse unavailable: {0}")]
    Unavailable(String),

    #[error("warehouse state lock poisoned")]
    Poisoned,

    #[error("invalid snapshot: {0}")]
    Snapshot(String),
}

impl WarehouseError {
    /// Failures a caller may retry with a fresh transaction.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WarehouseError::Conflict { .. } | WarehouseError::Unavailable(_)
        )
    }
}

impl From<WarehouseError> for PlanningError {
    fn from(err: WarehouseError) -> Self {
        match err {
            WarehouseError::Domain(e) => PlanningError::Domain(e),
            other => PlanningError::transient(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for WarehouseError {
    fn from(err: serde_json::Error) -> Self {
        WarehouseError::Snapshot(err.to_string())
    }
}

impl From<std::io::Error> for WarehouseError {
    fn from(err: std::io::Error) -> Self {
        WarehouseError::Snapshot(err.to_string())
    }
}
