use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use replenish_core::{Aggregate, AggregateRoot, DomainError};
use replenish_events::EventEnvelope;
use replenish_planning::{
    MoveQuery, NewOrder, OrderLifecycle, OrderQuery, PlanningResult, WarehouseReader,
};
use replenish_procurement::{
    CancelOrder, ChangeQuantity, CreateOrder, DetachOrder, DownstreamUpdate, OrderCommand,
    OrderEvent, ReplenishmentOrder, RescheduleOrder, RunOrder,
};
use replenish_stock::{
    LocationId, LocationUsage, MoveId, MoveState, OrderId, ProductId, StockMove, StockQuant,
};

use super::state::WarehouseState;
use super::store::{InMemoryWarehouse, StagedChanges};
use super::{ORDER_AGGREGATE_TYPE, WarehouseError};

/// Staged state captured by [`WarehouseTransaction::savepoint`].
#[derive(Debug, Clone)]
pub struct Savepoint {
    staged: WarehouseState,
    expected: BTreeMap<OrderId, u64>,
    touched_orders: BTreeSet<OrderId>,
    touched_moves: BTreeSet<MoveId>,
    events: usize,
}

/// A unit of work against an [`InMemoryWarehouse`].
///
/// Reads and writes go to a private copy of the state taken at `begin`, so the
/// planner sees its own writes and nobody else's. Dropping the transaction
/// without committing discards everything.
#[derive(Debug)]
pub struct WarehouseTransaction<'a> {
    warehouse: &'a InMemoryWarehouse,
    staged: WarehouseState,
    expected: BTreeMap<OrderId, u64>,
    touched_orders: BTreeSet<OrderId>,
    touched_moves: BTreeSet<MoveId>,
    events: Vec<EventEnvelope<OrderEvent>>,
}

impl<'a> WarehouseTransaction<'a> {
    pub(crate) fn new(warehouse: &'a InMemoryWarehouse, staged: WarehouseState) -> Self {
        Self {
            warehouse,
            staged,
            expected: BTreeMap::new(),
            touched_orders: BTreeSet::new(),
            touched_moves: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    /// The staged view, including this transaction's writes.
    pub fn state(&self) -> &WarehouseState {
        &self.staged
    }

    /// Events produced so far and not yet committed.
    pub fn pending_events(&self) -> &[EventEnvelope<OrderEvent>] {
        &self.events
    }

    pub fn is_dirty(&self) -> bool {
        !self.touched_orders.is_empty() || !self.touched_moves.is_empty()
    }

    pub fn savepoint(&self) -> Savepoint {
        Savepoint {
            staged: self.staged.clone(),
            expected: self.expected.clone(),
            touched_orders: self.touched_orders.clone(),
            touched_moves: self.touched_moves.clone(),
            events: self.events.len(),
        }
    }

    /// Undo everything written after `savepoint` was taken.
    pub fn rollback_to(&mut self, savepoint: Savepoint) {
        self.staged = savepoint.staged;
        self.expected = savepoint.expected;
        self.touched_orders = savepoint.touched_orders;
        self.touched_moves = savepoint.touched_moves;
        self.events.truncate(savepoint.events);
    }

    /// Merge the touched records into the shared warehouse.
    ///
    /// Fails with [`WarehouseError::Conflict`] when another transaction
    /// committed a change to one of the same orders first.
    pub fn commit(self) -> Result<usize, WarehouseError> {
        if !self.is_dirty() {
            return Ok(0);
        }
        let events = self.events.len();
        let changes = StagedChanges {
            orders: self
                .touched_orders
                .iter()
                .filter_map(|id| self.staged.orders.get(id).cloned())
                .collect(),
            moves: self
                .touched_moves
                .iter()
                .filter_map(|id| self.staged.moves.get(id).cloned())
                .collect(),
            expected: self.expected,
            events: self.events,
        };
        self.warehouse.merge(changes)?;
        Ok(events)
    }

    pub fn rollback(self) {
        debug!(
            orders = self.touched_orders.len(),
            moves = self.touched_moves.len(),
            "rolled back warehouse transaction"
        );
    }

    /// Change an open order's quantity; it may not drop below what its done
    /// moves already delivered.
    pub fn change_order_quantity(&mut self, id: OrderId, quantity: f64) -> Result<(), WarehouseError> {
        let delivered: f64 = self
            .staged
            .moves
            .values()
            .filter(|m| m.order == Some(id) && m.state == MoveState::Done)
            .map(|m| m.quantity)
            .sum();
        self.execute(
            id,
            OrderCommand::ChangeQuantity(ChangeQuantity {
                order_id: id,
                quantity,
                delivered,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    fn execute(&mut self, id: OrderId, command: OrderCommand) -> Result<(), WarehouseError> {
        if self.warehouse.take_fault() {
            return Err(WarehouseError::Unavailable(format!(
                "write to order {id} failed"
            )));
        }
        let order = self
            .staged
            .orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("order {id}")))?;
        let before = order.version();
        let events = order.execute(&command)?;
        if events.is_empty() {
            return Ok(());
        }
        let company = order.company();

        self.expected.entry(id).or_insert(before);
        self.touched_orders.insert(id);
        for (offset, event) in events.iter().enumerate() {
            self.events.push(EventEnvelope::new(
                Uuid::now_v7(),
                company,
                id.0,
                ORDER_AGGREGATE_TYPE,
                before + offset as u64 + 1,
                event.clone(),
            ));
            self.apply_downstream(id, event);
        }
        Ok(())
    }

    /// Propagate an order event to the moves linked to the order.
    fn apply_downstream(&mut self, id: OrderId, event: &OrderEvent) {
        let mut touched = Vec::new();
        match event {
            OrderEvent::OrderRescheduled(e) if e.downstream == DownstreamUpdate::Propagate => {
                for mv in self.staged.moves.values_mut() {
                    if mv.order == Some(id) && !mv.state.is_terminal() {
                        mv.date_expected = e.date_planned;
                        touched.push(mv.id);
                    }
                }
            }
            OrderEvent::OrderQuantityChanged(e) => {
                let delivered: f64 = self
                    .staged
                    .moves
                    .values()
                    .filter(|m| m.order == Some(id) && m.state == MoveState::Done)
                    .map(|m| m.quantity)
                    .sum();
                let remaining = e.quantity - delivered;
                for mv in self.staged.moves.values_mut() {
                    if mv.order == Some(id) && !mv.state.is_terminal() && remaining > 0.0 {
                        mv.quantity = remaining;
                        touched.push(mv.id);
                    }
                }
            }
            OrderEvent::OrderCancelled(e) => {
                for move_id in &e.moves {
                    if let Some(mv) = self.staged.moves.get_mut(move_id) {
                        if mv.state != MoveState::Done {
                            mv.state = MoveState::Cancel;
                            touched.push(mv.id);
                        }
                    }
                }
            }
            OrderEvent::OrderDetached(e) => {
                for move_id in &e.moves {
                    if let Some(mv) = self.staged.moves.get_mut(move_id) {
                        mv.order = None;
                        touched.push(mv.id);
                    }
                }
            }
            _ => {}
        }
        self.touched_moves.extend(touched);
    }
}

impl WarehouseReader for WarehouseTransaction<'_> {
    fn top_parent_location(&self, location: LocationId) -> PlanningResult<LocationId> {
        self.staged.top_parent_location(location)
    }

    fn location_usage(&self, location: LocationId) -> PlanningResult<LocationUsage> {
        self.staged.location_usage(location)
    }

    fn quants(&self, product: ProductId, location: LocationId) -> PlanningResult<Vec<StockQuant>> {
        self.staged.quants(product, location)
    }

    fn moves(&self, query: &MoveQuery) -> PlanningResult<Vec<StockMove>> {
        self.staged.moves(query)
    }

    fn stock_move(&self, id: MoveId) -> PlanningResult<Option<StockMove>> {
        self.staged.stock_move(id)
    }

    fn orders(&self, query: &OrderQuery) -> PlanningResult<Vec<ReplenishmentOrder>> {
        self.staged.orders(query)
    }

    fn order(&self, id: OrderId) -> PlanningResult<Option<ReplenishmentOrder>> {
        self.staged.order(id)
    }
}

impl OrderLifecycle for WarehouseTransaction<'_> {
    fn create_order(&mut self, order: NewOrder) -> PlanningResult<OrderId> {
        let id = OrderId::generate();
        self.staged.orders.insert(id, ReplenishmentOrder::empty(id));
        let created = self.execute(
            id,
            OrderCommand::CreateOrder(CreateOrder {
                company: order.company,
                order_id: id,
                product: order.product,
                location: order.location,
                quantity: order.quantity,
                date_planned: order.date_planned,
                occurred_at: Utc::now(),
            }),
        );
        if let Err(err) = created {
            self.staged.orders.remove(&id);
            return Err(err.into());
        }
        Ok(id)
    }

    fn run_order(&mut self, id: OrderId) -> PlanningResult<()> {
        let order = self
            .staged
            .orders
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("order {id}")))?;
        let (Some(product), Some(destination), Some(date)) =
            (order.product(), order.location(), order.date_planned())
        else {
            return Err(DomainError::invariant(format!("order {id} has not been created")).into());
        };
        let fulfillment = StockMove {
            id: MoveId::generate(),
            product,
            source: self.staged.supplier,
            destination,
            quantity: order.quantity(),
            state: MoveState::Draft,
            date_expected: date,
            order: Some(id),
        };

        self.execute(
            id,
            OrderCommand::RunOrder(RunOrder {
                order_id: id,
                move_id: fulfillment.id,
                occurred_at: Utc::now(),
            }),
        )?;
        self.touched_moves.insert(fulfillment.id);
        self.staged.moves.insert(fulfillment.id, fulfillment);
        Ok(())
    }

    fn reschedule_order(
        &mut self,
        id: OrderId,
        date_planned: DateTime<Utc>,
        downstream: DownstreamUpdate,
    ) -> PlanningResult<()> {
        self.execute(
            id,
            OrderCommand::RescheduleOrder(RescheduleOrder {
                order_id: id,
                date_planned,
                downstream,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    fn cancel_order(&mut self, id: OrderId) -> PlanningResult<()> {
        self.execute(
            id,
            OrderCommand::CancelOrder(CancelOrder {
                order_id: id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    fn detach_order(&mut self, id: OrderId) -> PlanningResult<()> {
        self.execute(
            id,
            OrderCommand::DetachOrder(DetachOrder {
                order_id: id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use replenish_planning::{MaxQtySchedule, PlanningError, PolicyId, ReorderPolicy};
    use replenish_procurement::{OrderSnapshot, OrderState};
    use replenish_stock::Location;

    use crate::warehouse::WarehouseSnapshot;

    const PRODUCT: u128 = 100;
    const STOCK: u128 = 2;
    const SUPPLIER: u128 = 4;
    const CUSTOMER: u128 = 5;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn warehouse() -> InMemoryWarehouse {
        let location = |id: u128, usage| Location {
            id: LocationId::from_u128(id),
            name: format!("loc-{id}"),
            parent: None,
            usage,
        };
        InMemoryWarehouse::from_snapshot(WarehouseSnapshot {
            locations: vec![
                location(STOCK, LocationUsage::Internal),
                location(SUPPLIER, LocationUsage::Supplier),
                location(CUSTOMER, LocationUsage::Customer),
            ],
            orders: vec![OrderSnapshot {
                id: OrderId::from_u128(60),
                company: None,
                product: ProductId::from_u128(PRODUCT),
                location: LocationId::from_u128(STOCK),
                quantity: 10.0,
                date_planned: day(4),
                state: OrderState::Confirmed,
                moves: Vec::new(),
                version: 1,
            }],
            policies: vec![ReorderPolicy {
                id: PolicyId::from_u128(70),
                company: None,
                product: ProductId::from_u128(PRODUCT),
                location: LocationId::from_u128(STOCK),
                min_qty: 5.0,
                max_qty: MaxQtySchedule::constant(20.0),
                lot_multiple: 0.0,
                rounding: Default::default(),
            }],
            ..WarehouseSnapshot::default()
        })
        .unwrap()
    }

    fn new_order(quantity: f64) -> NewOrder {
        NewOrder {
            company: None,
            product: ProductId::from_u128(PRODUCT),
            location: LocationId::from_u128(STOCK),
            quantity,
            date_planned: day(2),
        }
    }

    fn existing() -> OrderId {
        OrderId::from_u128(60)
    }

    #[test]
    fn created_and_run_order_gets_a_draft_fulfillment_move() {
        let wh = warehouse();
        let mut tx = wh.begin().unwrap();
        let id = tx.create_order(new_order(15.0)).unwrap();
        tx.run_order(id).unwrap();

        let order = tx.order(id).unwrap().unwrap();
        assert_eq!(order.state(), OrderState::Running);
        let mv = tx.stock_move(order.moves()[0]).unwrap().unwrap();
        assert_eq!(mv.state, MoveState::Draft);
        assert_eq!(mv.source, LocationId::from_u128(SUPPLIER));
        assert_eq!(mv.destination, LocationId::from_u128(STOCK));
        assert_eq!(mv.date_expected, day(2));
        assert_eq!(tx.commit().unwrap(), 2);

        let journal = wh.journal().unwrap();
        let types: Vec<_> = journal.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["order.created", "order.run"]);
        let sequence: Vec<_> = journal.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequence, vec![1, 2]);
        assert_eq!(journal[0].aggregate_type(), ORDER_AGGREGATE_TYPE);
        assert!(wh.read(|s| s.order(id).unwrap().is_some()).unwrap());
    }

    #[test]
    fn uncommitted_work_is_invisible_and_dropped() {
        let wh = warehouse();
        let mut tx = wh.begin().unwrap();
        let id = tx.create_order(new_order(15.0)).unwrap();
        assert!(wh.read(|s| s.order(id).unwrap().is_none()).unwrap());
        tx.rollback();

        assert!(wh.read(|s| s.order(id).unwrap().is_none()).unwrap());
        assert!(wh.journal().unwrap().is_empty());
    }

    #[test]
    fn rollback_to_savepoint_keeps_earlier_writes() {
        let wh = warehouse();
        let mut tx = wh.begin().unwrap();
        tx.reschedule_order(existing(), day(5), DownstreamUpdate::Propagate)
            .unwrap();
        let savepoint = tx.savepoint();
        let id = tx.create_order(new_order(15.0)).unwrap();
        tx.rollback_to(savepoint);

        assert!(tx.order(id).unwrap().is_none());
        assert_eq!(tx.pending_events().len(), 1);
        tx.commit().unwrap();
        assert_eq!(
            wh.read(|s| s.order(existing()).unwrap().unwrap().date_planned())
                .unwrap(),
            Some(day(5))
        );
    }

    #[test]
    fn concurrent_writes_to_one_order_conflict() {
        let wh = warehouse();
        let mut first = wh.begin().unwrap();
        let mut second = wh.begin().unwrap();
        first
            .reschedule_order(existing(), day(6), DownstreamUpdate::Propagate)
            .unwrap();
        second
            .reschedule_order(existing(), day(7), DownstreamUpdate::Propagate)
            .unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(
            err,
            WarehouseError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn reschedule_propagates_only_when_asked() {
        let wh = warehouse();
        let mut tx = wh.begin().unwrap();
        let id = tx.create_order(new_order(15.0)).unwrap();
        tx.run_order(id).unwrap();
        let move_id = tx.order(id).unwrap().unwrap().moves()[0];

        tx.reschedule_order(id, day(3), DownstreamUpdate::Skip).unwrap();
        assert_eq!(tx.stock_move(move_id).unwrap().unwrap().date_expected, day(2));

        tx.reschedule_order(id, day(4), DownstreamUpdate::Propagate)
            .unwrap();
        assert_eq!(tx.stock_move(move_id).unwrap().unwrap().date_expected, day(4));
    }

    #[test]
    fn cancel_and_detach_release_the_fulfillment_move() {
        let wh = warehouse();
        let mut tx = wh.begin().unwrap();
        let id = tx.create_order(new_order(15.0)).unwrap();
        tx.run_order(id).unwrap();
        let move_id = tx.order(id).unwrap().unwrap().moves()[0];

        tx.cancel_order(id).unwrap();
        tx.detach_order(id).unwrap();
        tx.commit().unwrap();

        let (state, mv) = wh
            .read(|s| {
                (
                    s.order(id).unwrap().unwrap().state(),
                    s.stock_move(move_id).unwrap().unwrap(),
                )
            })
            .unwrap();
        assert_eq!(state, OrderState::Cancelled);
        assert_eq!(mv.state, MoveState::Cancel);
        assert_eq!(mv.order, None);
    }

    #[test]
    fn quantity_cannot_drop_below_delivered() {
        let wh = warehouse();
        let mut tx = wh.begin().unwrap();
        let id = tx.create_order(new_order(15.0)).unwrap();
        tx.run_order(id).unwrap();
        let move_id = tx.order(id).unwrap().unwrap().moves()[0];
        if let Some(mv) = tx.staged.moves.get_mut(&move_id) {
            mv.state = MoveState::Done;
        }

        let err = tx.change_order_quantity(id, 10.0).unwrap_err();
        assert!(matches!(err, WarehouseError::Domain(ref e) if e.is_validation()));
        tx.change_order_quantity(id, 20.0).unwrap();
        assert_eq!(tx.order(id).unwrap().unwrap().quantity(), 20.0);
    }

    #[test]
    fn invalid_quantity_leaves_no_half_created_order() {
        let wh = warehouse();
        let mut tx = wh.begin().unwrap();
        let err = tx.create_order(new_order(0.0)).unwrap_err();
        assert!(matches!(err, PlanningError::Domain(ref e) if e.is_validation()));
        assert!(!tx.is_dirty());
        assert_eq!(tx.state().all_orders().count(), 1);
    }

    #[test]
    fn injected_failures_surface_as_transient() {
        let wh = warehouse();
        wh.inject_transient_failures(1);
        let mut tx = wh.begin().unwrap();
        let err = tx
            .reschedule_order(existing(), day(5), DownstreamUpdate::Propagate)
            .unwrap_err();
        assert!(err.is_transient());
        tx.reschedule_order(existing(), day(5), DownstreamUpdate::Propagate)
            .unwrap();
    }
}
