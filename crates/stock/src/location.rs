use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use replenish_core::{DomainError, DomainResult};

replenish_core::typed_id!(
    /// Stock location identifier.
    LocationId
);

/// What a location is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationUsage {
    Internal,
    Transit,
    Supplier,
    Customer,
    Inventory,
    Production,
    View,
}

impl LocationUsage {
    /// Locations whose content counts as stock on hand.
    pub fn is_stockable(self) -> bool {
        matches!(self, LocationUsage::Internal | LocationUsage::Transit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    #[serde(default)]
    pub parent: Option<LocationId>,
    pub usage: LocationUsage,
}

/// Immutable snapshot of the location tree.
///
/// Built once per unit of work from the current location records; nothing is
/// cached across snapshots, so edits to a parent or usage are picked up by the
/// next snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationGraph {
    locations: BTreeMap<LocationId, Location>,
}

impl LocationGraph {
    pub fn new(locations: impl IntoIterator<Item = Location>) -> Self {
        Self {
            locations: locations.into_iter().map(|l| (l.id, l)).collect(),
        }
    }

    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(&id)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn usage(&self, id: LocationId) -> DomainResult<LocationUsage> {
        self.require(id).map(|l| l.usage)
    }

    /// Highest ancestor reachable through internal-usage parents (or `id`
    /// itself when its parent is missing or not internal).
    ///
    /// Idempotent: `top_parent(top_parent(x)) == top_parent(x)`.
    pub fn top_parent(&self, id: LocationId) -> DomainResult<LocationId> {
        let mut current = self.require(id)?;
        for _ in 0..=self.locations.len() {
            match current.parent.and_then(|p| self.locations.get(&p)) {
                Some(parent) if parent.usage == LocationUsage::Internal => current = parent,
                _ => return Ok(current.id),
            }
        }
        Err(DomainError::invariant(format!(
            "location hierarchy above {id} contains a cycle"
        )))
    }

    /// Descendant-or-self test.
    pub fn is_child_of(&self, id: LocationId, ancestor: LocationId) -> bool {
        let mut current = Some(id);
        for _ in 0..=self.locations.len() {
            match current {
                Some(c) if c == ancestor => return true,
                Some(c) => current = self.locations.get(&c).and_then(|l| l.parent),
                None => return false,
            }
        }
        false
    }

    /// `ancestor` and every location below it.
    pub fn subtree(&self, ancestor: LocationId) -> BTreeSet<LocationId> {
        self.locations
            .keys()
            .copied()
            .filter(|id| self.is_child_of(*id, ancestor))
            .collect()
    }

    fn require(&self, id: LocationId) -> DomainResult<&Location> {
        self.locations
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("location {id}")))
    }
}
