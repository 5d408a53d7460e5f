//! Timeline construction: every known event affecting the stock of one product
//! at one aggregated location, as typed entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replenish_procurement::ReplenishmentOrder;
use replenish_stock::{LocationId, MoveId, MoveState, OrderId, ProductId, StockMove};

use crate::error::PlanningResult;
use crate::ports::{MoveQuery, OrderQuery, WarehouseReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Stock on hand when the timeline starts.
    Existing,
    /// Confirmed inbound move.
    Incoming,
    /// Confirmed outbound move.
    Outgoing,
    /// Replenishment order with no confirmed move yet.
    Planned,
}

impl EntryKind {
    pub const ALL: [EntryKind; 4] = [
        EntryKind::Existing,
        EntryKind::Incoming,
        EntryKind::Outgoing,
        EntryKind::Planned,
    ];

    /// Position among entries sharing the same date.
    pub fn rank(self) -> u8 {
        match self {
            EntryKind::Existing => 0,
            EntryKind::Incoming => 1,
            EntryKind::Outgoing => 2,
            EntryKind::Planned => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: String,
    pub product: ProductId,
    pub location: LocationId,
    pub kind: EntryKind,
    /// Only an existing baseline with nothing else on the timeline is undated.
    pub date: Option<DateTime<Utc>>,
    /// Signed: negative for outgoing moves.
    pub delta_qty: f64,
    pub source_order_id: Option<OrderId>,
    pub source_move_id: Option<MoveId>,
}

/// Entries of one product at one top-parent location, in construction order.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub product: ProductId,
    pub location: LocationId,
    pub entries: Vec<TimelineEntry>,
}

/// Stable entry key: `{product}-{location}-{move | order | "existing"}`.
pub fn entry_id(
    product: ProductId,
    location: LocationId,
    move_id: Option<MoveId>,
    order_id: Option<OrderId>,
) -> String {
    match (move_id, order_id) {
        (Some(m), _) => format!("{product}-{location}-{m}"),
        (None, Some(o)) => format!("{product}-{location}-{o}"),
        (None, None) => format!("{product}-{location}-existing"),
    }
}

/// Collect the timeline of `product` at the top parent of `location`.
pub fn build_timeline<R: WarehouseReader + ?Sized>(
    reader: &R,
    product: ProductId,
    location: LocationId,
) -> PlanningResult<Timeline> {
    let top = reader.top_parent_location(location)?;
    let mut entries = Vec::new();

    for mv in reader.moves(&MoveQuery::incoming(product, top))? {
        if !reader.location_usage(mv.destination)?.is_stockable()
            || reader.top_parent_location(mv.destination)? != top
        {
            continue;
        }
        let (date, order) = move_date(reader, &mv)?;
        entries.push(TimelineEntry {
            id: entry_id(product, top, Some(mv.id), order),
            product,
            location: top,
            kind: EntryKind::Incoming,
            date: Some(date),
            delta_qty: mv.quantity,
            source_order_id: order,
            source_move_id: Some(mv.id),
        });
    }

    for mv in reader.moves(&MoveQuery::outgoing(product, top))? {
        if !reader.location_usage(mv.source)?.is_stockable() {
            continue;
        }
        let (date, _) = move_date(reader, &mv)?;
        entries.push(TimelineEntry {
            id: entry_id(product, top, Some(mv.id), None),
            product,
            location: top,
            kind: EntryKind::Outgoing,
            date: Some(date),
            delta_qty: -mv.quantity,
            source_order_id: None,
            source_move_id: Some(mv.id),
        });
    }

    for order in reader.orders(&OrderQuery::open(product, top))? {
        let (Some(order_location), Some(date)) = (order.location(), order.date_planned()) else {
            continue;
        };
        if !reader.location_usage(order_location)?.is_stockable()
            || !awaits_fulfillment(reader, &order)?
        {
            continue;
        }
        let id = order.id_typed();
        entries.push(TimelineEntry {
            id: entry_id(product, top, None, Some(id)),
            product,
            location: top,
            kind: EntryKind::Planned,
            date: Some(date),
            delta_qty: order.quantity(),
            source_order_id: Some(id),
            source_move_id: None,
        });
    }

    let mut on_hand = None;
    for quant in reader.quants(product, top)? {
        if reader.location_usage(quant.location)?.is_stockable()
            && reader.top_parent_location(quant.location)? == top
        {
            *on_hand.get_or_insert(0.0) += quant.quantity;
        }
    }
    if let Some(quantity) = on_hand {
        let date = entries.iter().filter_map(|e| e.date).min();
        entries.insert(
            0,
            TimelineEntry {
                id: entry_id(product, top, None, None),
                product,
                location: top,
                kind: EntryKind::Existing,
                date,
                delta_qty: quantity,
                source_order_id: None,
                source_move_id: None,
            },
        );
    }

    Ok(Timeline {
        product,
        location: top,
        entries,
    })
}

/// A move is dated by its order's planned date when it has one.
fn move_date<R: WarehouseReader + ?Sized>(
    reader: &R,
    mv: &StockMove,
) -> PlanningResult<(DateTime<Utc>, Option<OrderId>)> {
    let Some(order_id) = mv.order else {
        return Ok((mv.date_expected, None));
    };
    match reader.order(order_id)? {
        Some(order) => Ok((order.date_planned().unwrap_or(mv.date_expected), Some(order_id))),
        None => Ok((mv.date_expected, None)),
    }
}

/// Whether the order's supply is not yet visible through a confirmed move.
///
/// Once any linked move is confirmed, that move's incoming entry already
/// carries the order's quantity.
fn awaits_fulfillment<R: WarehouseReader + ?Sized>(
    reader: &R,
    order: &ReplenishmentOrder,
) -> PlanningResult<bool> {
    for id in order.moves() {
        if let Some(mv) = reader.stock_move(*id)? {
            if mv.state != MoveState::Draft {
                return Ok(false);
            }
        }
    }
    Ok(true)
}
