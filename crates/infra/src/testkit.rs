//! Seed data for warehouse, batch and end-to-end tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use replenish_core::CompanyId;
use replenish_planning::{MaxQtySchedule, PolicyId, ReorderPolicy};
use replenish_procurement::ReplenishmentOrder;
use replenish_stock::{
    Location, LocationId, LocationUsage, MoveId, MoveState, ProductId, StockMove, StockQuant,
};

use crate::warehouse::{InMemoryWarehouse, WarehouseSnapshot};

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub fn stock() -> LocationId {
    LocationId::from_u128(2)
}

pub fn shelf() -> LocationId {
    LocationId::from_u128(3)
}

pub fn customer() -> LocationId {
    LocationId::from_u128(5)
}

pub fn policy_id(product: u128) -> PolicyId {
    PolicyId::from_u128(1_000 + product)
}

/// view > stock > shelf, plus a supplier and a customer location.
pub struct Seed {
    snapshot: WarehouseSnapshot,
    next_move: u128,
}

impl Seed {
    pub fn new() -> Self {
        let location = |id: u128, parent: Option<u128>, usage| Location {
            id: LocationId::from_u128(id),
            name: format!("loc-{id}"),
            parent: parent.map(LocationId::from_u128),
            usage,
        };
        Self {
            snapshot: WarehouseSnapshot {
                locations: vec![
                    location(1, None, LocationUsage::View),
                    location(2, Some(1), LocationUsage::Internal),
                    location(3, Some(2), LocationUsage::Internal),
                    location(4, None, LocationUsage::Supplier),
                    location(5, None, LocationUsage::Customer),
                ],
                ..WarehouseSnapshot::default()
            },
            next_move: 10_000,
        }
    }

    /// `on_hand` on the shelf, one delivery of `demand` at `at`, and a
    /// 10 / 50 / lot 5 policy on the stock location.
    pub fn product(mut self, product: u128, on_hand: f64, demand: f64, at: DateTime<Utc>) -> Self {
        let id = ProductId::from_u128(product);
        self.snapshot.quants.push(StockQuant {
            product: id,
            location: shelf(),
            quantity: on_hand,
        });
        self.next_move += 1;
        self.snapshot.moves.push(StockMove {
            id: MoveId::from_u128(self.next_move),
            product: id,
            source: shelf(),
            destination: customer(),
            quantity: demand,
            state: MoveState::Confirmed,
            date_expected: at,
            order: None,
        });
        self.snapshot.policies.push(ReorderPolicy {
            id: policy_id(product),
            company: None,
            product: id,
            location: stock(),
            min_qty: 10.0,
            max_qty: MaxQtySchedule::constant(50.0),
            lot_multiple: 5.0,
            rounding: Default::default(),
        });
        self
    }

    pub fn owned_by(mut self, product: u128, company: CompanyId) -> Self {
        for policy in &mut self.snapshot.policies {
            if policy.id == policy_id(product) {
                policy.company = Some(company);
            }
        }
        self
    }

    /// A policy pointing at a location the warehouse does not know.
    pub fn broken_policy(mut self, product: u128) -> Self {
        self = self.product(product, 0.0, 1.0, day(1));
        if let Some(policy) = self.snapshot.policies.last_mut() {
            policy.location = LocationId::from_u128(999);
        }
        self
    }

    pub fn snapshot(self) -> WarehouseSnapshot {
        self.snapshot
    }

    pub fn build(self) -> InMemoryWarehouse {
        InMemoryWarehouse::from_snapshot(self.snapshot).unwrap()
    }
}

/// Open orders of `product`, by date.
pub fn open_orders(warehouse: &InMemoryWarehouse, product: u128) -> Vec<ReplenishmentOrder> {
    let mut orders: Vec<_> = warehouse
        .read(|s| {
            s.all_orders()
                .filter(|o| {
                    o.product() == Some(ProductId::from_u128(product)) && o.state().is_open()
                })
                .cloned()
                .collect()
        })
        .unwrap();
    orders.sort_by_key(|o| o.date_planned());
    orders
}
