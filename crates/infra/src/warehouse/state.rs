use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use replenish_core::{CompanyId, DomainError};
use replenish_planning::{
    MoveDirection, MoveQuery, OrderQuery, PlanningResult, PolicyId, ReorderPolicy,
    WarehouseReader,
};
use replenish_procurement::ReplenishmentOrder;
use replenish_stock::{
    Location, LocationGraph, LocationId, LocationUsage, MoveId, OrderId, ProductId, StockMove,
    StockQuant,
};

use super::snapshot::WarehouseSnapshot;

/// Which reorder policies a batch run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFilter {
    /// Restrict to these products; `None` means every product.
    #[serde(default)]
    pub products: Option<Vec<ProductId>>,
    #[serde(default)]
    pub company: Option<CompanyId>,
}

impl PolicyFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn products(mut self, products: impl IntoIterator<Item = ProductId>) -> Self {
        self.products = Some(products.into_iter().collect());
        self
    }

    pub fn company(mut self, company: CompanyId) -> Self {
        self.company = Some(company);
        self
    }

    pub fn matches(&self, policy: &ReorderPolicy) -> bool {
        let product_ok = self
            .products
            .as_ref()
            .is_none_or(|products| products.contains(&policy.product));
        let company_ok = self.company.is_none_or(|c| policy.company == Some(c));
        product_ok && company_ok
    }
}

/// Every stock and order record, as one consistent view.
#[derive(Debug, Clone)]
pub struct WarehouseState {
    pub(crate) graph: LocationGraph,
    pub(crate) quants: Vec<StockQuant>,
    pub(crate) moves: BTreeMap<MoveId, StockMove>,
    pub(crate) orders: BTreeMap<OrderId, ReplenishmentOrder>,
    pub(crate) policies: BTreeMap<PolicyId, ReorderPolicy>,
    pub(crate) supplier: LocationId,
}

impl WarehouseState {
    /// Validate and load a snapshot.
    pub fn from_snapshot(snapshot: WarehouseSnapshot) -> Result<Self, DomainError> {
        let mut locations = snapshot.locations;
        let supplier = match snapshot.supplier.or_else(|| {
            locations
                .iter()
                .find(|l| l.usage == LocationUsage::Supplier)
                .map(|l| l.id)
        }) {
            Some(id) => id,
            None => {
                let id = LocationId::generate();
                locations.push(Location {
                    id,
                    name: "Vendors".to_string(),
                    parent: None,
                    usage: LocationUsage::Supplier,
                });
                id
            }
        };
        let graph = LocationGraph::new(locations);
        if graph.get(supplier).is_none() {
            return Err(DomainError::not_found(format!("supplier location {supplier}")));
        }

        let mut moves = BTreeMap::new();
        for mv in snapshot.moves {
            if !(mv.quantity.is_finite() && mv.quantity > 0.0) {
                return Err(DomainError::validation(format!(
                    "move {}: quantity must be positive",
                    mv.id
                )));
            }
            moves.insert(mv.id, mv);
        }

        let mut orders = BTreeMap::new();
        for snapshot in snapshot.orders {
            let order = ReplenishmentOrder::restore(snapshot)?;
            orders.insert(order.id_typed(), order);
        }

        let mut policies = BTreeMap::new();
        for policy in snapshot.policies {
            policy.validate()?;
            policies.insert(policy.id, policy);
        }

        Ok(Self {
            graph,
            quants: snapshot.quants,
            moves,
            orders,
            policies,
            supplier,
        })
    }

    pub fn to_snapshot(&self) -> WarehouseSnapshot {
        WarehouseSnapshot {
            locations: self.graph.iter().cloned().collect(),
            quants: self.quants.clone(),
            moves: self.moves.values().cloned().collect(),
            orders: self.orders.values().filter_map(|o| o.snapshot()).collect(),
            policies: self.policies.values().cloned().collect(),
            supplier: Some(self.supplier),
        }
    }

    pub fn supplier(&self) -> LocationId {
        self.supplier
    }

    pub fn locations(&self) -> &LocationGraph {
        &self.graph
    }

    pub fn policy(&self, id: PolicyId) -> Option<&ReorderPolicy> {
        self.policies.get(&id)
    }

    /// Policies selected by `filter`, by id.
    pub fn policies(&self, filter: &PolicyFilter) -> Vec<ReorderPolicy> {
        self.policies
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    /// Every order, open or not, by id.
    pub fn all_orders(&self) -> impl Iterator<Item = &ReplenishmentOrder> {
        self.orders.values()
    }

    pub fn all_moves(&self) -> impl Iterator<Item = &StockMove> {
        self.moves.values()
    }

    fn order_matches(&self, order: &ReplenishmentOrder, query: &OrderQuery) -> PlanningResult<bool> {
        let (Some(product), Some(location), Some(date)) =
            (order.product(), order.location(), order.date_planned())
        else {
            return Ok(false);
        };
        if product != query.product
            || !query.accepts_state(order.state())
            || !query.accepts_date(date)
        {
            return Ok(false);
        }
        Ok(self.graph.top_parent(location)? == query.location)
    }
}

impl WarehouseReader for WarehouseState {
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
        let mut moves: Vec<StockMove> = self
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
            if self.order_matches(order, query)? {
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use replenish_planning::MaxQtySchedule;
    use replenish_procurement::{OrderSnapshot, OrderState};
    use replenish_stock::MoveState;

    fn location(id: u128, parent: Option<u128>, usage: LocationUsage) -> Location {
        Location {
            id: LocationId::from_u128(id),
            name: format!("loc-{id}"),
            parent: parent.map(LocationId::from_u128),
            usage,
        }
    }

    fn seed() -> WarehouseSnapshot {
        let product = ProductId::from_u128(100);
        let day = |n| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n);
        WarehouseSnapshot {
            locations: vec![
                location(1, None, LocationUsage::View),
                location(2, Some(1), LocationUsage::Internal),
                location(3, Some(2), LocationUsage::Internal),
                location(5, None, LocationUsage::Customer),
            ],
            quants: vec![StockQuant {
                product,
                location: LocationId::from_u128(3),
                quantity: 12.0,
            }],
            moves: vec![StockMove {
                id: MoveId::from_u128(50),
                product,
                source: LocationId::from_u128(3),
                destination: LocationId::from_u128(5),
                quantity: 4.0,
                state: MoveState::Assigned,
                date_expected: day(2),
                order: None,
            }],
            orders: vec![OrderSnapshot {
                id: OrderId::from_u128(60),
                company: None,
                product,
                location: LocationId::from_u128(3),
                quantity: 10.0,
                date_planned: day(4),
                state: OrderState::Confirmed,
                moves: Vec::new(),
                version: 1,
            }],
            policies: vec![ReorderPolicy {
                id: PolicyId::from_u128(70),
                company: Some(CompanyId::from_u128(9)),
                product,
                location: LocationId::from_u128(2),
                min_qty: 5.0,
                max_qty: MaxQtySchedule::constant(20.0),
                lot_multiple: 0.0,
                rounding: Default::default(),
            }],
            supplier: None,
        }
    }

    #[test]
    fn missing_supplier_gets_a_virtual_location() {
        let state = WarehouseState::from_snapshot(seed()).unwrap();
        assert_eq!(
            state.location_usage(state.supplier()).unwrap(),
            LocationUsage::Supplier
        );
        assert_eq!(state.locations().len(), 5);
    }

    #[test]
    fn orders_resolve_through_their_top_parent() {
        let state = WarehouseState::from_snapshot(seed()).unwrap();
        let query = OrderQuery::open(ProductId::from_u128(100), LocationId::from_u128(2));
        let orders = state.orders(&query).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id_typed(), OrderId::from_u128(60));
    }

    #[test]
    fn quants_and_moves_are_read_over_the_subtree() {
        let state = WarehouseState::from_snapshot(seed()).unwrap();
        let product = ProductId::from_u128(100);
        let stock = LocationId::from_u128(2);
        assert_eq!(state.quants(product, stock).unwrap().len(), 1);
        assert_eq!(state.moves(&MoveQuery::outgoing(product, stock)).unwrap().len(), 1);
        assert!(state.moves(&MoveQuery::incoming(product, stock)).unwrap().is_empty());
    }

    #[test]
    fn policy_filter_by_product_and_company() {
        let state = WarehouseState::from_snapshot(seed()).unwrap();
        assert_eq!(state.policies(&PolicyFilter::all()).len(), 1);
        assert_eq!(
            state
                .policies(&PolicyFilter::all().products([ProductId::from_u128(1)]))
                .len(),
            0
        );
        assert_eq!(
            state
                .policies(&PolicyFilter::all().company(CompanyId::from_u128(9)))
                .len(),
            1
        );
        assert_eq!(
            state
                .policies(&PolicyFilter::all().company(CompanyId::from_u128(8)))
                .len(),
            0
        );
    }

    #[test]
    fn snapshot_export_reloads() {
        let state = WarehouseState::from_snapshot(seed()).unwrap();
        let exported = state.to_snapshot();
        let json = exported.to_json_pretty().unwrap();
        let reloaded = WarehouseSnapshot::from_json(&json).unwrap();
        assert_eq!(reloaded, exported);
        assert_eq!(reloaded.supplier, Some(state.supplier()));
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let mut snapshot = seed();
        snapshot.policies[0].min_qty = -1.0;
        assert!(WarehouseState::from_snapshot(snapshot).unwrap_err().is_validation());
    }
}
