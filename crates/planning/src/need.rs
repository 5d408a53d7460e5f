use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replenish_stock::{MoveId, OrderId};

use crate::error::PlanningResult;
use crate::policy::ReorderPolicy;
use crate::ports::WarehouseReader;
use crate::projection::{ProjectedPoint, ProjectionQuery, compute_projection};
use crate::timeline::EntryKind;

/// The earliest outgoing point where projected stock falls below the minimum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Need {
    pub entry_id: String,
    pub date: DateTime<Utc>,
    /// Signed quantity of the move that causes the shortfall.
    pub move_qty: f64,
    pub running_qty: f64,
    pub move_id: Option<MoveId>,
    pub order_id: Option<OrderId>,
}

/// Scan projected points for the first outgoing shortfall.
pub fn find_need(points: &[ProjectedPoint], policy: &ReorderPolicy) -> Option<Need> {
    points
        .iter()
        .filter(|p| p.kind() == EntryKind::Outgoing)
        .find_map(|p| {
            let date = p.date()?;
            policy
                .rounding
                .compare(p.running_qty, policy.min_qty)
                .is_lt()
                .then(|| Need {
                    entry_id: p.entry.id.clone(),
                    date,
                    move_qty: p.entry.delta_qty,
                    running_qty: p.running_qty,
                    move_id: p.entry.source_move_id,
                    order_id: p.entry.source_order_id,
                })
        })
}

/// Next need of `policy` against the reader's current state.
pub fn next_need<R: WarehouseReader + ?Sized>(
    reader: &R,
    policy: &ReorderPolicy,
) -> PlanningResult<Option<Need>> {
    let query =
        ProjectionQuery::new(policy.product, policy.location).kinds([EntryKind::Outgoing]);
    let points = compute_projection(reader, &query)?;
    Ok(find_need(&points, policy))
}
