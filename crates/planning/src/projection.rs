//! Running-quantity projection over a timeline.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replenish_stock::{LocationId, ProductId};

use crate::error::PlanningResult;
use crate::ports::WarehouseReader;
use crate::timeline::{EntryKind, TimelineEntry, build_timeline};

/// A timeline entry with the stock level right after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    #[serde(flatten)]
    pub entry: TimelineEntry,
    pub running_qty: f64,
}

impl ProjectedPoint {
    pub fn kind(&self) -> EntryKind {
        self.entry.kind
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.entry.date
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionSort {
    #[default]
    Date,
    RunningQty,
}

/// Read-only projection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionQuery {
    pub product: ProductId,
    pub location: LocationId,
    pub kinds: Vec<EntryKind>,
    #[serde(default)]
    pub sort: ProjectionSort,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ProjectionQuery {
    /// All kinds, by date ascending, unlimited.
    pub fn new(product: ProductId, location: LocationId) -> Self {
        Self {
            product,
            location,
            kinds: EntryKind::ALL.to_vec(),
            sort: ProjectionSort::Date,
            descending: false,
            limit: None,
        }
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = EntryKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn sorted_by(mut self, sort: ProjectionSort, descending: bool) -> Self {
        self.sort = sort;
        self.descending = descending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order, filter and truncate points produced by [`project`].
    ///
    /// Sorting is stable, also when descending: entries that compare equal
    /// keep their projection order.
    pub fn apply(&self, mut points: Vec<ProjectedPoint>) -> Vec<ProjectedPoint> {
        let key = |a: &ProjectedPoint, b: &ProjectedPoint| match self.sort {
            ProjectionSort::Date => a.date().cmp(&b.date()),
            ProjectionSort::RunningQty => a.running_qty.total_cmp(&b.running_qty),
        };
        if self.descending {
            points.sort_by(|a, b| key(b, a));
        } else if self.sort != ProjectionSort::Date {
            points.sort_by(key);
        }

        points.retain(|p| self.kinds.contains(&p.kind()));
        if let Some(limit) = self.limit {
            points.truncate(limit);
        }
        points
    }
}

fn chronological(a: &TimelineEntry, b: &TimelineEntry) -> Ordering {
    a.date
        .cmp(&b.date)
        .then_with(|| a.kind.rank().cmp(&b.kind.rank()))
}

/// Sort entries chronologically and fold them into running quantities.
///
/// The baseline is the sum of all existing entries; every other entry adds its
/// delta. Undated entries sort first; equal dates break ties by kind, then by
/// construction order.
pub fn project(mut entries: Vec<TimelineEntry>) -> Vec<ProjectedPoint> {
    entries.sort_by(chronological);

    let mut running: f64 = entries
        .iter()
        .filter(|e| e.kind == EntryKind::Existing)
        .map(|e| e.delta_qty)
        .sum();

    entries
        .into_iter()
        .map(|entry| {
            if entry.kind != EntryKind::Existing {
                running += entry.delta_qty;
            }
            ProjectedPoint {
                entry,
                running_qty: running,
            }
        })
        .collect()
}

/// Build, fold and shape the projection of one product at one location.
pub fn compute_projection<R: WarehouseReader + ?Sized>(
    reader: &R,
    query: &ProjectionQuery,
) -> PlanningResult<Vec<ProjectedPoint>> {
    let timeline = build_timeline(reader, query.product, query.location)?;
    Ok(query.apply(project(timeline.entries)))
}

/// Stock level after the last dated point strictly before `date`.
///
/// `points` must be in projection order.
pub fn stock_before(points: &[ProjectedPoint], date: DateTime<Utc>) -> Option<f64> {
    points
        .iter()
        .rev()
        .find(|p| p.date().is_some_and(|d| d < date))
        .map(|p| p.running_qty)
}

/// Stock level after the last dated point at or before `date`.
pub fn stock_until(points: &[ProjectedPoint], date: DateTime<Utc>) -> Option<f64> {
    points
        .iter()
        .rev()
        .find(|p| p.date().is_some_and(|d| d <= date))
        .map(|p| p.running_qty)
}
