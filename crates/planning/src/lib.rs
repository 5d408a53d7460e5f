//! Replenishment planning.
//!
//! Given a reorder policy (product, location, min/max thresholds) this crate
//! rebuilds the stock timeline of the pair, projects running quantities,
//! detects shortfalls and issues create/reschedule/cancel intents against an
//! order-lifecycle collaborator until no shortfall remains.
//!
//! Everything here is synchronous and storage-agnostic: reads and writes go
//! through the [`ports`] traits, implemented by the infrastructure layer.

pub mod error;
pub mod need;
pub mod planner;
pub mod policy;
pub mod ports;
pub mod projection;
pub mod redistribute;
pub mod settings;
pub mod timeline;

#[cfg(test)]
mod testkit;

pub use error::{PlanningError, PlanningResult};
pub use need::{Need, find_need, next_need};
pub use planner::{PlanReport, ReplenishmentPlanner};
pub use policy::{MaxQtyOverride, MaxQtySchedule, PolicyId, ReorderPolicy};
pub use ports::{
    MoveDirection, MoveQuery, NewOrder, OrderLifecycle, OrderQuery, Warehouse, WarehouseReader,
};
pub use projection::{
    ProjectedPoint, ProjectionQuery, ProjectionSort, compute_projection, project, stock_before,
    stock_until,
};
pub use redistribute::{Redistribution, Window, redistribute};
pub use settings::PlannerSettings;
pub use timeline::{EntryKind, Timeline, TimelineEntry, build_timeline, entry_id};
