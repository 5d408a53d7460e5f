use chrono::{DateTime, Utc};
use thiserror::Error;

use replenish_core::DomainError;
use replenish_stock::{LocationId, ProductId};

pub type PlanningResult<T> = Result<T, PlanningError>;

/// Failures of a planning run for one reorder policy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanningError {
    /// Rejected input or state (e.g. an order quantity that rounds to zero).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A need survived its own resolution: the same entry is still short at
    /// the same date, or the policy hit the iteration cap.
    #[error(
        "need at {date} for product {product} in location {location} (entry {entry_id}) did not converge"
    )]
    Convergence {
        product: ProductId,
        location: LocationId,
        date: DateTime<Utc>,
        entry_id: String,
    },

    /// A collaborator read or write failed in a way worth retrying.
    #[error("transient collaborator failure: {0}")]
    Transient(String),
}

impl PlanningError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
