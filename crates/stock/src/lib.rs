//! Stock domain module.
//!
//! Locations, stock moves and on-hand quants as the replenishment planner sees
//! them. Pure data and graph logic (no IO, no storage).

pub mod location;
pub mod movement;
pub mod product;

pub use location::{Location, LocationGraph, LocationId, LocationUsage};
pub use movement::{MoveId, MoveState, OrderId, StockMove, StockQuant};
pub use product::ProductId;
