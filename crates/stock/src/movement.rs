use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::LocationId;
use crate::product::ProductId;

replenish_core::typed_id!(
    /// Stock move identifier.
    MoveId
);

replenish_core::typed_id!(
    /// Replenishment order identifier.
    ///
    /// Declared here because fulfillment moves point back at the order that
    /// generated them; the order aggregate itself lives in the procurement crate.
    OrderId
);

/// Stock move state lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveState {
    Draft,
    Confirmed,
    Waiting,
    Assigned,
    Done,
    Cancel,
}

impl MoveState {
    /// Confirmed but not yet executed: the move still affects future stock.
    pub fn is_pending(self) -> bool {
        !matches!(self, MoveState::Draft | MoveState::Done | MoveState::Cancel)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MoveState::Done | MoveState::Cancel)
    }
}

/// A planned transfer of product between two locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMove {
    pub id: MoveId,
    pub product: ProductId,
    pub source: LocationId,
    pub destination: LocationId,
    /// Quantity in the product's unit of measure. Always positive.
    pub quantity: f64,
    pub state: MoveState,
    pub date_expected: DateTime<Utc>,
    /// Order this move fulfils, if any.
    #[serde(default)]
    pub order: Option<OrderId>,
}

/// On-hand quantity of a product in one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuant {
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: f64,
}
