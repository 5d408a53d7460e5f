//! The per-policy control loop: resolve needs until none is left, then settle
//! the tail of the timeline.

use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use replenish_procurement::{DownstreamUpdate, ReplenishmentOrder};
use replenish_stock::OrderId;

use crate::error::{PlanningError, PlanningResult};
use crate::need::{Need, next_need};
use crate::policy::{PolicyId, ReorderPolicy};
use crate::ports::{NewOrder, OrderQuery, Warehouse, WarehouseReader};
use crate::projection::{ProjectedPoint, project, stock_until};
use crate::redistribute::{Window, redistribute};
use crate::settings::PlannerSettings;
use crate::timeline::{EntryKind, build_timeline};

/// What one planning run did to the orders of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanReport {
    pub policy: PolicyId,
    pub needs_resolved: usize,
    pub orders_created: usize,
    pub orders_rescheduled: usize,
    pub orders_removed: usize,
}

impl PlanReport {
    fn new(policy: PolicyId) -> Self {
        Self {
            policy,
            needs_resolved: 0,
            orders_created: 0,
            orders_rescheduled: 0,
            orders_removed: 0,
        }
    }

    /// `true` when the run left every order untouched.
    pub fn is_noop(&self) -> bool {
        self.orders_created == 0 && self.orders_rescheduled == 0 && self.orders_removed == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplenishmentPlanner {
    settings: PlannerSettings,
}

impl ReplenishmentPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Plan one reorder policy against `warehouse`.
    ///
    /// Each detected need is closed either by pulling the next future order in
    /// front of it or by creating a new order. Overstock is redistributed over
    /// the stretch between consecutive needs and over the tail, and orders no
    /// longer needed at the end of the timeline are cancelled.
    pub fn process<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        policy: &ReorderPolicy,
    ) -> PlanningResult<PlanReport> {
        let span = info_span!(
            "reorder_policy",
            policy = %policy.id,
            product = %policy.product,
            location = %policy.location,
        );
        let _enter = span.enter();

        policy.validate()?;
        let mut report = PlanReport::new(policy.id);
        let mut cursor: Option<DateTime<Utc>> = None;
        let mut previous: Option<Need> = None;

        while let Some(need) = next_need(&*warehouse, policy)? {
            self.check_progress(policy, previous.as_ref(), &need, report.needs_resolved)?;
            debug!(
                date = %need.date,
                running_qty = need.running_qty,
                entry = %need.entry_id,
                "resolving need"
            );

            let window = Window {
                start: cursor,
                end: need.date,
            };
            report.orders_rescheduled +=
                redistribute(warehouse, policy, window, &self.settings)?.rescheduled;
            cursor = Some(need.date);

            let date_planned = need.date - self.settings.time_unit;
            match next_order(&*warehouse, policy, need.date)? {
                Some(order) => {
                    warehouse.reschedule_order(order, date_planned, DownstreamUpdate::Propagate)?;
                    report.orders_rescheduled += 1;
                    debug!(order = %order, to = %date_planned, "pulled future order to need");
                }
                None => {
                    let quantity = policy.replenishment_qty(need.running_qty, need.date);
                    let order = warehouse.create_order(NewOrder {
                        company: policy.company,
                        product: policy.product,
                        location: policy.location,
                        quantity,
                        date_planned,
                    })?;
                    warehouse.run_order(order)?;
                    report.orders_created += 1;
                    debug!(order = %order, quantity, date = %date_planned, "created order for need");
                }
            }

            report.needs_resolved += 1;
            previous = Some(need);
        }

        if let Some(last) = last_scheduled_date(&*warehouse, policy)? {
            let tail_end = last + self.settings.tail_margin;
            let window = Window {
                start: cursor,
                end: tail_end,
            };
            report.orders_rescheduled +=
                redistribute(warehouse, policy, window, &self.settings)?.rescheduled;
            report.orders_removed += remove_unnecessary(warehouse, policy, tail_end)?;
        }

        info!(
            needs = report.needs_resolved,
            created = report.orders_created,
            rescheduled = report.orders_rescheduled,
            removed = report.orders_removed,
            "reorder policy processed"
        );
        Ok(report)
    }

    /// A need at the same entry and date as the previous one must at least be
    /// less short than before.
    fn check_progress(
        &self,
        policy: &ReorderPolicy,
        previous: Option<&Need>,
        need: &Need,
        resolved: usize,
    ) -> PlanningResult<()> {
        let stalled = previous.is_some_and(|p| {
            p.entry_id == need.entry_id
                && p.date == need.date
                && !policy.rounding.compare(need.running_qty, p.running_qty).is_gt()
        });
        if stalled || resolved >= self.settings.max_iterations {
            return Err(PlanningError::Convergence {
                product: policy.product,
                location: policy.location,
                date: need.date,
                entry_id: need.entry_id.clone(),
            });
        }
        Ok(())
    }
}

fn full_projection<R: WarehouseReader + ?Sized>(
    reader: &R,
    policy: &ReorderPolicy,
) -> PlanningResult<Vec<ProjectedPoint>> {
    Ok(project(
        build_timeline(reader, policy.product, policy.location)?.entries,
    ))
}

/// First open order supplying the timeline strictly after `date`.
fn next_order<R: WarehouseReader + ?Sized>(
    reader: &R,
    policy: &ReorderPolicy,
    date: DateTime<Utc>,
) -> PlanningResult<Option<OrderId>> {
    for point in full_projection(reader, policy)? {
        let (Some(point_date), Some(order_id)) = (point.date(), point.entry.source_order_id)
        else {
            continue;
        };
        if point_date <= date {
            continue;
        }
        if reader
            .order(order_id)?
            .is_some_and(|o| o.state().is_open())
        {
            return Ok(Some(order_id));
        }
    }
    Ok(None)
}

/// Latest date on the timeline, planned orders included.
fn last_scheduled_date<R: WarehouseReader + ?Sized>(
    reader: &R,
    policy: &ReorderPolicy,
) -> PlanningResult<Option<DateTime<Utc>>> {
    Ok(full_projection(reader, policy)?
        .iter()
        .filter_map(|p| p.date())
        .max())
}

/// Cancel and detach orders placed after the last outgoing move and up to
/// `tail_end` whose supply is not needed to keep stock at the minimum there.
/// Larger orders are considered first.
fn remove_unnecessary<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    policy: &ReorderPolicy,
    tail_end: DateTime<Utc>,
) -> PlanningResult<usize> {
    let top = warehouse.top_parent_location(policy.location)?;
    let mut points = full_projection(&*warehouse, policy)?;
    let last_outgoing = points
        .iter()
        .filter(|p| p.kind() == EntryKind::Outgoing)
        .filter_map(|p| p.date())
        .filter(|d| *d <= tail_end)
        .max();

    let query = OrderQuery::open(policy.product, top).planned_to(Bound::Included(tail_end));
    let mut candidates: Vec<ReplenishmentOrder> = warehouse
        .orders(&query)?
        .into_iter()
        .filter(|o| match (o.date_planned(), last_outgoing) {
            (Some(d), Some(last)) => d > last,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .collect();
    candidates.sort_by(|a, b| b.quantity().total_cmp(&a.quantity()));

    let mut removed = 0;
    for order in candidates {
        let id = order.id_typed();
        let Some(level) = stock_until(&points, tail_end) else {
            break;
        };
        let supplied: f64 = points
            .iter()
            .filter(|p| p.entry.source_order_id == Some(id) && p.date().is_some_and(|d| d <= tail_end))
            .map(|p| p.entry.delta_qty)
            .sum();
        if policy.rounding.compare(level - supplied, policy.min_qty).is_lt() {
            continue;
        }

        warehouse.cancel_order(id)?;
        warehouse.detach_order(id)?;
        removed += 1;
        debug!(order = %id, quantity = order.quantity(), "removed unnecessary order");
        points = full_projection(&*warehouse, policy)?;
    }
    Ok(removed)
}
