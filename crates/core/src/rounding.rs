//! Quantity rounding at a unit-of-measure precision.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Rounding precision of a product's unit of measure (e.g. `0.01`, `1.0`).
///
/// All quantity comparisons in the planner go through this type so that
/// float noise below the precision never flips a decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct UomRounding(f64);

impl ValueObject for UomRounding {}

impl UomRounding {
    pub fn new(precision: f64) -> DomainResult<Self> {
        if !(precision.is_finite() && precision > 0.0) {
            return Err(DomainError::validation(format!(
                "rounding precision must be a finite positive number, got {precision}"
            )));
        }
        Ok(Self(precision))
    }

    pub fn precision(&self) -> f64 {
        self.0
    }

    /// Round half away from zero to the nearest multiple of the precision.
    pub fn round(&self, quantity: f64) -> f64 {
        let steps = (quantity / self.0).round();
        // Dividing by an integral inverse keeps decimal precisions exact
        // (4500 / 100 == 45.0, whereas 4500 * 0.01 is not).
        let inverse = (1.0 / self.0).round();
        if inverse >= 1.0 && (inverse * self.0 - 1.0).abs() < 1e-9 {
            steps / inverse
        } else {
            steps * self.0
        }
    }

    pub fn is_zero(&self, quantity: f64) -> bool {
        self.round(quantity) == 0.0
    }

    /// Compare two quantities at this precision.
    pub fn compare(&self, a: f64, b: f64) -> Ordering {
        let delta = a - b;
        if self.is_zero(delta) {
            Ordering::Equal
        } else if delta < 0.0 {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

impl Default for UomRounding {
    fn default() -> Self {
        Self(0.01)
    }
}

impl TryFrom<f64> for UomRounding {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UomRounding> for f64 {
    fn from(value: UomRounding) -> Self {
        value.0
    }
}
