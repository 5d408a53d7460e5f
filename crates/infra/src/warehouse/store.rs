use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};

use replenish_core::{AggregateRoot, ExpectedVersion};
use replenish_events::EventEnvelope;
use replenish_planning::ReorderPolicy;
use replenish_procurement::{OrderEvent, ReplenishmentOrder};
use replenish_stock::{OrderId, StockMove};

use super::snapshot::WarehouseSnapshot;
use super::state::{PolicyFilter, WarehouseState};
use super::transaction::WarehouseTransaction;
use super::WarehouseError;

/// Records a transaction wants merged back into the shared state.
#[derive(Debug, Default)]
pub(crate) struct StagedChanges {
    /// Version each touched order had when the transaction first wrote it.
    pub expected: BTreeMap<OrderId, u64>,
    pub orders: Vec<ReplenishmentOrder>,
    pub moves: Vec<StockMove>,
    pub events: Vec<EventEnvelope<OrderEvent>>,
}

/// Scripted write failures: let `skip` writes through, then fail `fail` of them.
#[derive(Debug, Default, Clone, Copy)]
struct FaultPlan {
    skip: usize,
    fail: usize,
}

/// Shared, lock-protected warehouse.
///
/// Readers get a consistent view; writers stage their work in a
/// [`WarehouseTransaction`] and merge it on commit.
#[derive(Debug)]
pub struct InMemoryWarehouse {
    state: RwLock<WarehouseState>,
    journal: RwLock<Vec<EventEnvelope<OrderEvent>>>,
    faults: Mutex<FaultPlan>,
}

impl InMemoryWarehouse {
    pub fn new(state: WarehouseState) -> Self {
        Self {
            state: RwLock::new(state),
            journal: RwLock::new(Vec::new()),
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    pub fn arc(state: WarehouseState) -> Arc<Self> {
        Arc::new(Self::new(state))
    }

    pub fn from_snapshot(snapshot: WarehouseSnapshot) -> Result<Self, WarehouseError> {
        Ok(Self::new(WarehouseState::from_snapshot(snapshot)?))
    }

    /// Seed from a JSON snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WarehouseError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let snapshot = WarehouseSnapshot::from_json(&json)?;
        info!(
            path = %path.display(),
            locations = snapshot.locations.len(),
            moves = snapshot.moves.len(),
            orders = snapshot.orders.len(),
            policies = snapshot.policies.len(),
            "loaded warehouse snapshot"
        );
        Self::from_snapshot(snapshot)
    }

    /// Open a unit of work over the current state.
    pub fn begin(&self) -> Result<WarehouseTransaction<'_>, WarehouseError> {
        let staged = self.state.read().map_err(|_| WarehouseError::Poisoned)?.clone();
        Ok(WarehouseTransaction::new(self, staged))
    }

    /// Run `f` against a consistent read-only view.
    pub fn read<T>(&self, f: impl FnOnce(&WarehouseState) -> T) -> Result<T, WarehouseError> {
        let state = self.state.read().map_err(|_| WarehouseError::Poisoned)?;
        Ok(f(&state))
    }

    pub fn policies(&self, filter: &PolicyFilter) -> Result<Vec<ReorderPolicy>, WarehouseError> {
        self.read(|state| state.policies(filter))
    }

    pub fn export(&self) -> Result<WarehouseSnapshot, WarehouseError> {
        self.read(WarehouseState::to_snapshot)
    }

    /// Order events committed so far, in commit order.
    pub fn journal(&self) -> Result<Vec<EventEnvelope<OrderEvent>>, WarehouseError> {
        Ok(self
            .journal
            .read()
            .map_err(|_| WarehouseError::Poisoned)?
            .clone())
    }

    /// Make the next `count` order writes fail as if the store were unreachable.
    pub fn inject_transient_failures(&self, count: usize) {
        self.inject_transient_failures_after(0, count);
    }

    /// Let `skip` order writes succeed, then fail the following `count`.
    pub fn inject_transient_failures_after(&self, skip: usize, count: usize) {
        if let Ok(mut plan) = self.faults.lock() {
            *plan = FaultPlan { skip, fail: count };
        }
    }

    pub(crate) fn take_fault(&self) -> bool {
        let Ok(mut plan) = self.faults.lock() else {
            return false;
        };
        if plan.skip > 0 {
            plan.skip -= 1;
            false
        } else if plan.fail > 0 {
            plan.fail -= 1;
            true
        } else {
            false
        }
    }

    /// Merge staged changes, rejecting them if a touched order moved on meanwhile.
    pub(crate) fn merge(&self, changes: StagedChanges) -> Result<(), WarehouseError> {
        let mut state = self.state.write().map_err(|_| WarehouseError::Poisoned)?;
        let mut journal = self.journal.write().map_err(|_| WarehouseError::Poisoned)?;

        for (&order, &expected) in &changes.expected {
            let actual = state.orders.get(&order).map_or(0, |o| o.version());
            if !ExpectedVersion::Exact(expected).matches(actual) {
                return Err(WarehouseError::Conflict {
                    order,
                    expected,
                    actual,
                });
            }
        }

        debug!(
            orders = changes.orders.len(),
            moves = changes.moves.len(),
            events = changes.events.len(),
            "merging staged warehouse changes"
        );
        for order in changes.orders {
            state.orders.insert(order.id_typed(), order);
        }
        for mv in changes.moves {
            state.moves.insert(mv.id, mv);
        }
        journal.extend(changes.events);
        Ok(())
    }
}
