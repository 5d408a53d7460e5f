//! Collaborator contracts.
//!
//! The planner reads stock state and issues order intents through these traits.
//! Implementations must serve every read of one planning run from a single
//! consistent view that includes the run's own writes.

use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replenish_core::CompanyId;
use replenish_procurement::{DownstreamUpdate, OrderState, ReplenishmentOrder};
use replenish_stock::{
    LocationId, LocationUsage, MoveId, OrderId, ProductId, StockMove, StockQuant,
};

use crate::error::PlanningResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    /// Moves whose destination lies in the location subtree.
    Incoming,
    /// Moves whose source lies in the location subtree.
    Outgoing,
}

/// Pending moves of one product entering or leaving a location subtree.
///
/// Results are ordered by expected date, ties by move id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveQuery {
    pub product: ProductId,
    pub location: LocationId,
    pub direction: MoveDirection,
}

impl MoveQuery {
    pub fn incoming(product: ProductId, location: LocationId) -> Self {
        Self {
            product,
            location,
            direction: MoveDirection::Incoming,
        }
    }

    pub fn outgoing(product: ProductId, location: LocationId) -> Self {
        Self {
            product,
            location,
            direction: MoveDirection::Outgoing,
        }
    }

    pub fn sort(moves: &mut [StockMove]) {
        moves.sort_by(|a, b| a.date_expected.cmp(&b.date_expected).then(a.id.cmp(&b.id)));
    }
}

/// Replenishment orders of one product whose location aggregates to `location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub product: ProductId,
    /// Top-parent location; orders match when their own location resolves to it.
    pub location: LocationId,
    pub states: Vec<OrderState>,
    pub planned_from: Bound<DateTime<Utc>>,
    pub planned_to: Bound<DateTime<Utc>>,
    /// Latest first. Ties keep ascending order id either way.
    pub descending: bool,
}

impl OrderQuery {
    /// Orders not yet done or cancelled, any date, earliest first.
    pub fn open(product: ProductId, location: LocationId) -> Self {
        Self {
            product,
            location,
            states: vec![OrderState::Confirmed, OrderState::Running],
            planned_from: Bound::Unbounded,
            planned_to: Bound::Unbounded,
            descending: false,
        }
    }

    pub fn planned_from(mut self, bound: Bound<DateTime<Utc>>) -> Self {
        self.planned_from = bound;
        self
    }

    pub fn planned_to(mut self, bound: Bound<DateTime<Utc>>) -> Self {
        self.planned_to = bound;
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn accepts_state(&self, state: OrderState) -> bool {
        self.states.contains(&state)
    }

    pub fn accepts_date(&self, date: DateTime<Utc>) -> bool {
        let after_start = match self.planned_from {
            Bound::Included(from) => date >= from,
            Bound::Excluded(from) => date > from,
            Bound::Unbounded => true,
        };
        let before_end = match self.planned_to {
            Bound::Included(to) => date <= to,
            Bound::Excluded(to) => date < to,
            Bound::Unbounded => true,
        };
        after_start && before_end
    }

    /// Order results the way this query asks for.
    pub fn sort(&self, orders: &mut [ReplenishmentOrder]) {
        let descending = self.descending;
        orders.sort_by(|a, b| {
            let by_date = a.date_planned().cmp(&b.date_planned());
            let by_date = if descending { by_date.reverse() } else { by_date };
            by_date.then(a.id_typed().cmp(&b.id_typed()))
        });
    }
}

/// A replenishment order the planner wants created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub company: Option<CompanyId>,
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: f64,
    pub date_planned: DateTime<Utc>,
}

/// Read side of the stock and order records.
pub trait WarehouseReader {
    fn top_parent_location(&self, location: LocationId) -> PlanningResult<LocationId>;

    fn location_usage(&self, location: LocationId) -> PlanningResult<LocationUsage>;

    /// On-hand quants of `product` anywhere in the subtree of `location`.
    fn quants(&self, product: ProductId, location: LocationId) -> PlanningResult<Vec<StockQuant>>;

    fn moves(&self, query: &MoveQuery) -> PlanningResult<Vec<StockMove>>;

    fn stock_move(&self, id: MoveId) -> PlanningResult<Option<StockMove>>;

    fn orders(&self, query: &OrderQuery) -> PlanningResult<Vec<ReplenishmentOrder>>;

    fn order(&self, id: OrderId) -> PlanningResult<Option<ReplenishmentOrder>>;
}

/// Write side: the order lifecycle operations the planner may trigger.
pub trait OrderLifecycle {
    /// Fails with a validation error when the quantity is not positive.
    fn create_order(&mut self, order: NewOrder) -> PlanningResult<OrderId>;

    /// Hand the order to fulfillment (generates its incoming move).
    fn run_order(&mut self, id: OrderId) -> PlanningResult<()>;

    /// No-op when the date is unchanged.
    fn reschedule_order(
        &mut self,
        id: OrderId,
        date_planned: DateTime<Utc>,
        downstream: DownstreamUpdate,
    ) -> PlanningResult<()>;

    fn cancel_order(&mut self, id: OrderId) -> PlanningResult<()>;

    /// Drop the order's links to its moves; the moves themselves are kept.
    fn detach_order(&mut self, id: OrderId) -> PlanningResult<()>;
}

/// Everything the planner needs from its collaborator.
pub trait Warehouse: WarehouseReader + OrderLifecycle {}

impl<T: WarehouseReader + OrderLifecycle + ?Sized> Warehouse for T {}
