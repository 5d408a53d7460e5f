//! In-process fake of the planner's collaborators.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use replenish_core::{Aggregate, DomainError, UomRounding};
use replenish_procurement::{
    CancelOrder, CreateOrder, DetachOrder, DownstreamUpdate, OrderCommand, OrderEvent,
    OrderState, ReplenishmentOrder, RescheduleOrder, RunOrder,
};
use replenish_stock::{
    Location, LocationGraph, LocationId, LocationUsage, MoveId, MoveState, OrderId, ProductId,
    StockMove, StockQuant,
};

use crate::error::PlanningResult;
use crate::policy::{MaxQtySchedule, PolicyId, ReorderPolicy};
use crate::ports::{MoveDirection, MoveQuery, NewOrder, OrderLifecycle, OrderQuery, WarehouseReader};

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

/// view > stock (internal) > bin (internal); supplier and customer outside.
pub struct FakeWarehouse {
    pub product: ProductId,
    pub stock: LocationId,
    pub bin: LocationId,
    pub supplier: LocationId,
    pub customer: LocationId,
    graph: LocationGraph,
    quants: Vec<StockQuant>,
    moves: BTreeMap<MoveId, StockMove>,
    orders: BTreeMap<OrderId, ReplenishmentOrder>,
    frozen: bool,
    next_id: u128,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        let view = LocationId::from_u128(1);
        let stock = LocationId::from_u128(2);
        let bin = LocationId::from_u128(3);
        let supplier = LocationId::from_u128(4);
        let customer = LocationId::from_u128(5);
        let location = |id, parent, usage| Location {
            id,
            name: id.to_string(),
            parent,
            usage,
        };
        Self {
            product: ProductId::from_u128(100),
            stock,
            bin,
            supplier,
            customer,
            graph: LocationGraph::new([
                location(view, None, LocationUsage::View),
                location(stock, Some(view), LocationUsage::Internal),
                location(bin, Some(stock), LocationUsage::Internal),
                location(supplier, None, LocationUsage::Supplier),
                location(customer, None, LocationUsage::Customer),
            ]),
            quants: Vec::new(),
            moves: BTreeMap::new(),
            orders: BTreeMap::new(),
            frozen: false,
            next_id: 1_000,
        }
    }

    fn next(&mut self) -> u128 {
        self.next_id += 1;
        self.next_id
    }

    pub fn policy(&self, min: f64, max: f64, lot: f64) -> ReorderPolicy {
        ReorderPolicy {
            id: PolicyId::from_u128(7),
            company: None,
            product: self.product,
            location: self.stock,
            min_qty: min,
            max_qty: MaxQtySchedule::constant(max),
            lot_multiple: lot,
            rounding: UomRounding::default(),
        }
    }

    pub fn quant(&mut self, location: LocationId, quantity: f64) {
        self.quants.push(StockQuant {
            product: self.product,
            location,
            quantity,
        });
    }

    fn add_move(
        &mut self,
        source: LocationId,
        destination: LocationId,
        quantity: f64,
        state: MoveState,
        date: DateTime<Utc>,
        order: Option<OrderId>,
    ) -> MoveId {
        let id = MoveId::from_u128(self.next());
        self.moves.insert(
            id,
            StockMove {
                id,
                product: self.product,
                source,
                destination,
                quantity,
                state,
                date_expected: date,
                order,
            },
        );
        id
    }

    pub fn incoming(&mut self, quantity: f64, date: DateTime<Utc>) -> MoveId {
        self.add_move(self.supplier, self.stock, quantity, MoveState::Confirmed, date, None)
    }

    pub fn outgoing(&mut self, quantity: f64, date: DateTime<Utc>) -> MoveId {
        self.add_move(self.stock, self.customer, quantity, MoveState::Confirmed, date, None)
    }

    pub fn set_move_state(&mut self, id: MoveId, state: MoveState) {
        if let Some(mv) = self.moves.get_mut(&id) {
            mv.state = state;
        }
    }

    pub fn add_order(&mut self, quantity: f64, date: DateTime<Utc>, state: OrderState) -> OrderId {
        let id = OrderId::from_u128(self.next());
        let order = ReplenishmentOrder::restore(replenish_procurement::OrderSnapshot {
            id,
            company: None,
            product: self.product,
            location: self.stock,
            quantity,
            date_planned: date,
            state,
            moves: Vec::new(),
            version: 1,
        })
        .unwrap();
        self.orders.insert(id, order);
        id
    }

    /// Attach an incoming fulfillment move in `state` to `order`.
    pub fn link_move(&mut self, order: OrderId, state: MoveState, date: DateTime<Utc>) -> MoveId {
        let quantity = self.orders[&order].quantity();
        let id = self.add_move(self.supplier, self.stock, quantity, state, date, Some(order));
        let mut snapshot = self.orders[&order].snapshot().unwrap();
        snapshot.moves.push(id);
        self.orders
            .insert(order, ReplenishmentOrder::restore(snapshot).unwrap());
        id
    }

    /// Accept lifecycle writes from now on without applying them.
    pub fn freeze_orders(&mut self) {
        self.frozen = true;
    }

    pub fn order_date(&self, id: OrderId) -> DateTime<Utc> {
        self.orders[&id].date_planned().unwrap()
    }

    pub fn order_state(&self, id: OrderId) -> OrderState {
        self.orders[&id].state()
    }

    /// Open orders, earliest first.
    pub fn open_orders(&self) -> Vec<ReplenishmentOrder> {
        let mut orders: Vec<_> = self
            .orders
            .values()
            .filter(|o| o.state().is_open())
            .cloned()
            .collect();
        OrderQuery::open(self.product, self.stock).sort(&mut orders);
        orders
    }

    fn execute(&mut self, id: OrderId, command: OrderCommand) -> PlanningResult<()> {
        if self.frozen {
            return Ok(());
        }
        let order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("order {id}")))?;
        for event in order.execute(&command)? {
            match event {
                OrderEvent::OrderRescheduled(e) if e.downstream == DownstreamUpdate::Propagate => {
                    for mv in self.moves.values_mut() {
                        if mv.order == Some(id) && !mv.state.is_terminal() {
                            mv.date_expected = e.date_planned;
                        }
                    }
                }
                OrderEvent::OrderCancelled(e) => {
                    for move_id in e.moves {
                        self.set_move_state(move_id, MoveState::Cancel);
                    }
                }
                OrderEvent::OrderDetached(e) => {
                    for move_id in e.moves {
                        if let Some(mv) = self.moves.get_mut(&move_id) {
                            mv.order = None;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl WarehouseReader for FakeWarehouse {
    fn top_parent_location(&self, location: LocationId) -> PlanningResult<LocationId> {
        Ok(self.graph.top_parent(location)?)
    }

    fn location_usage(&self, location: LocationId) -> PlanningResult<LocationUsage> {
        Ok(self.graph.usage(location)?)
    }

    fn quants(&self, product: ProductId, location: LocationId) -> PlanningResult<Vec<StockQuant>> {
        Ok(self
            .quants
            .iter()
            .filter(|q| q.product == product && self.graph.is_child_of(q.location, location))
            .cloned()
            .collect())
    }

    fn moves(&self, query: &MoveQuery) -> PlanningResult<Vec<StockMove>> {
        let mut moves: Vec<_> = self
            .moves
            .values()
            .filter(|m| m.product == query.product && m.state.is_pending())
            .filter(|m| {
                let end = match query.direction {
                    MoveDirection::Incoming => m.destination,
                    MoveDirection::Outgoing => m.source,
                };
                self.graph.is_child_of(end, query.location)
            })
            .cloned()
            .collect();
        MoveQuery::sort(&mut moves);
        Ok(moves)
    }

    fn stock_move(&self, id: MoveId) -> PlanningResult<Option<StockMove>> {
        Ok(self.moves.get(&id).cloned())
    }

    fn orders(&self, query: &OrderQuery) -> PlanningResult<Vec<ReplenishmentOrder>> {
        let mut orders = Vec::new();
        for order in self.orders.values() {
            let (Some(product), Some(location), Some(date)) =
                (order.product(), order.location(), order.date_planned())
            else {
                continue;
            };
            if product == query.product
                && query.accepts_state(order.state())
                && query.accepts_date(date)
                && self.graph.top_parent(location)? == query.location
            {
                orders.push(order.clone());
            }
        }
        query.sort(&mut orders);
        Ok(orders)
    }

    fn order(&self, id: OrderId) -> PlanningResult<Option<ReplenishmentOrder>> {
        Ok(self.orders.get(&id).cloned())
    }
}

impl OrderLifecycle for FakeWarehouse {
    fn create_order(&mut self, order: NewOrder) -> PlanningResult<OrderId> {
        let id = OrderId::from_u128(self.next());
        if self.frozen {
            return Ok(id);
        }
        let mut aggregate = ReplenishmentOrder::empty(id);
        aggregate.execute(&OrderCommand::CreateOrder(CreateOrder {
            company: order.company,
            order_id: id,
            product: order.product,
            location: order.location,
            quantity: order.quantity,
            date_planned: order.date_planned,
            occurred_at: day(0),
        }))?;
        self.orders.insert(id, aggregate);
        Ok(id)
    }

    fn run_order(&mut self, id: OrderId) -> PlanningResult<()> {
        let Some(order) = self.orders.get(&id) else {
            return self.execute(id, OrderCommand::RunOrder(RunOrder {
                order_id: id,
                move_id: MoveId::from_u128(0),
                occurred_at: day(0),
            }));
        };
        let (quantity, date, destination) = (
            order.quantity(),
            order.date_planned().unwrap_or_else(|| day(0)),
            order.location().unwrap_or(self.stock),
        );
        let move_id = self.add_move(self.supplier, destination, quantity, MoveState::Draft, date, Some(id));
        self.execute(id, OrderCommand::RunOrder(RunOrder {
            order_id: id,
            move_id,
            occurred_at: day(0),
        }))
    }

    fn reschedule_order(
        &mut self,
        id: OrderId,
        date_planned: DateTime<Utc>,
        downstream: DownstreamUpdate,
    ) -> PlanningResult<()> {
        self.execute(id, OrderCommand::RescheduleOrder(RescheduleOrder {
            order_id: id,
            date_planned,
            downstream,
            occurred_at: day(0),
        }))
    }

    fn cancel_order(&mut self, id: OrderId) -> PlanningResult<()> {
        self.execute(id, OrderCommand::CancelOrder(CancelOrder {
            order_id: id,
            occurred_at: day(0),
        }))
    }

    fn detach_order(&mut self, id: OrderId) -> PlanningResult<()> {
        self.execute(id, OrderCommand::DetachOrder(DetachOrder {
            order_id: id,
            occurred_at: day(0),
        }))
    }
}
