//! Procurement domain module (event-sourced).
//!
//! The replenishment order aggregate: the only durable record the planner
//! mutates. Pure decision logic, no IO.

pub mod order;

pub use order::{
    CancelOrder, ChangeQuantity, CreateOrder, DetachOrder, DownstreamUpdate, OrderCancelled,
    OrderCommand, OrderCreated, OrderDetached, OrderEvent, OrderQuantityChanged,
    OrderRescheduled, OrderRun, OrderSnapshot, OrderState, ReplenishmentOrder, RescheduleOrder,
    RunOrder,
};
pub use replenish_stock::OrderId;
