use serde::{Deserialize, Serialize};

use replenish_planning::ReorderPolicy;
use replenish_procurement::OrderSnapshot;
use replenish_stock::{Location, LocationId, StockMove, StockQuant};

/// Serializable seed / export of the whole warehouse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarehouseSnapshot {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub quants: Vec<StockQuant>,
    #[serde(default)]
    pub moves: Vec<StockMove>,
    #[serde(default)]
    pub orders: Vec<OrderSnapshot>,
    #[serde(default)]
    pub policies: Vec<ReorderPolicy>,
    /// Source location of generated fulfillment moves. Defaults to the first
    /// supplier location, or a virtual one when there is none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<LocationId>,
}

impl WarehouseSnapshot {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
