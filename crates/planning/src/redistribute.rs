//! Overstock redistribution: delay orders whose arrival would push stock over
//! the maximum, without opening a shortfall.

use std::ops::Bound;

use chrono::{DateTime, Utc};
use tracing::debug;

use replenish_procurement::DownstreamUpdate;

use crate::error::PlanningResult;
use crate::need::next_need;
use crate::policy::ReorderPolicy;
use crate::ports::{OrderQuery, Warehouse};
use crate::projection::{project, stock_before};
use crate::settings::PlannerSettings;
use crate::timeline::build_timeline;

/// Half-open date window `[start, end)`; no start means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Redistribution {
    pub examined: usize,
    /// Orders that ended up on a different date.
    pub rescheduled: usize,
    /// Pushes that were pulled back in front of a need they opened.
    pub pulled_back: usize,
}

/// Single greedy pass over the policy's open orders in `window`, latest first.
///
/// Each overstocked order is pushed to the end of the window, then pulled back
/// to just before the next need if the push opened one inside the window.
/// Later orders are settled before earlier ones are looked at; the result is
/// a locally feasible delay per order, not an optimum.
pub fn redistribute<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    policy: &ReorderPolicy,
    window: Window,
    settings: &PlannerSettings,
) -> PlanningResult<Redistribution> {
    let top = warehouse.top_parent_location(policy.location)?;
    let from = window.start.map_or(Bound::Unbounded, Bound::Included);
    let query = OrderQuery::open(policy.product, top)
        .planned_from(from)
        .planned_to(Bound::Excluded(window.end))
        .descending();

    let mut outcome = Redistribution::default();
    for order in warehouse.orders(&query)? {
        let Some(date_planned) = order.date_planned() else {
            continue;
        };
        outcome.examined += 1;

        let stock_date = (date_planned + settings.horizon).min(window.end);
        let timeline = build_timeline(&*warehouse, policy.product, policy.location)?;
        let Some(level) = stock_before(&project(timeline.entries), stock_date) else {
            continue;
        };
        if !policy.rounding.compare(level, policy.max_qty.at(stock_date)).is_gt() {
            continue;
        }

        let id = order.id_typed();
        let mut new_date = window.end - settings.time_unit;
        warehouse.reschedule_order(id, new_date, DownstreamUpdate::Propagate)?;

        if let Some(need) = next_need(&*warehouse, policy)? {
            if need.date < window.end {
                new_date = need.date - settings.time_unit;
                warehouse.reschedule_order(id, new_date, DownstreamUpdate::Propagate)?;
                outcome.pulled_back += 1;
            }
        }
        if new_date != date_planned {
            outcome.rescheduled += 1;
            debug!(
                order = %id,
                stock = level,
                from = %date_planned,
                to = %new_date,
                "rescheduled over-supplying order"
            );
        }
    }
    Ok(outcome)
}
