use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replenish_core::{CompanyId, DomainError, DomainResult, UomRounding};
use replenish_stock::{LocationId, ProductId};

replenish_core::typed_id!(
    /// Reorder policy (orderpoint) identifier.
    PolicyId
);

/// A maximum quantity that takes effect from `from` onwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxQtyOverride {
    pub from: DateTime<Utc>,
    pub max_qty: f64,
}

/// Maximum stock level as a step function of time.
///
/// Deserializes from either a plain number or `{ "base": .., "overrides": [..] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MaxQtyRepr")]
pub struct MaxQtySchedule {
    base: f64,
    overrides: Vec<MaxQtyOverride>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaxQtyRepr {
    Constant(f64),
    Schedule {
        base: f64,
        #[serde(default)]
        overrides: Vec<MaxQtyOverride>,
    },
}

impl From<MaxQtyRepr> for MaxQtySchedule {
    fn from(repr: MaxQtyRepr) -> Self {
        match repr {
            MaxQtyRepr::Constant(base) => Self::constant(base),
            MaxQtyRepr::Schedule { base, overrides } => overrides
                .into_iter()
                .fold(Self::constant(base), |s, o| s.with_override(o.from, o.max_qty)),
        }
    }
}

impl MaxQtySchedule {
    pub fn constant(max_qty: f64) -> Self {
        Self {
            base: max_qty,
            overrides: Vec::new(),
        }
    }

    pub fn with_override(mut self, from: DateTime<Utc>, max_qty: f64) -> Self {
        let at = self.overrides.partition_point(|o| o.from <= from);
        self.overrides.insert(at, MaxQtyOverride { from, max_qty });
        self
    }

    /// Maximum in force at `date`.
    pub fn at(&self, date: DateTime<Utc>) -> f64 {
        self.overrides
            .iter()
            .rev()
            .find(|o| o.from <= date)
            .map_or(self.base, |o| o.max_qty)
    }

    fn values(&self) -> impl Iterator<Item = f64> + '_ {
        std::iter::once(self.base).chain(self.overrides.iter().map(|o| o.max_qty))
    }
}

/// Reorder policy for one (product, location) pair. Read-only to the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderPolicy {
    pub id: PolicyId,
    #[serde(default)]
    pub company: Option<CompanyId>,
    pub product: ProductId,
    pub location: LocationId,
    pub min_qty: f64,
    pub max_qty: MaxQtySchedule,
    /// Replenishment quantities are rounded up to a multiple of this; 0 disables.
    #[serde(default)]
    pub lot_multiple: f64,
    #[serde(default)]
    pub rounding: UomRounding,
}

impl ReorderPolicy {
    pub fn validate(&self) -> DomainResult<()> {
        if !(self.min_qty.is_finite() && self.min_qty >= 0.0) {
            return Err(DomainError::validation(format!(
                "policy {}: min_qty must be a non-negative number",
                self.id
            )));
        }
        if self.max_qty.values().any(|v| !v.is_finite() || v < 0.0) {
            return Err(DomainError::validation(format!(
                "policy {}: max_qty must be a non-negative number",
                self.id
            )));
        }
        if !(self.lot_multiple.is_finite() && self.lot_multiple >= 0.0) {
            return Err(DomainError::validation(format!(
                "policy {}: lot_multiple must be a non-negative number",
                self.id
            )));
        }
        Ok(())
    }

    /// Quantity to order so that stock at `running_qty` is brought back up to
    /// the larger of min and max, rounded up to the lot multiple.
    pub fn replenishment_qty(&self, running_qty: f64, date: DateTime<Utc>) -> f64 {
        let mut qty = self.min_qty.max(self.max_qty.at(date)) - running_qty;
        if self.lot_multiple > 0.0 {
            let rest = qty.rem_euclid(self.lot_multiple);
            if self.rounding.compare(rest, 0.0).is_gt() {
                qty += self.lot_multiple - rest;
            }
        }
        self.rounding.round(qty)
    }
}
