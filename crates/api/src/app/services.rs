//! Service wiring shared by the handlers.

use std::sync::Arc;

use replenish_events::EventEnvelope;
use replenish_infra::warehouse::WarehouseState;
use replenish_infra::{
    BatchReport, BatchScheduler, InMemoryWarehouse, PolicyFilter, ReplenishmentConfig,
    WarehouseError, WarehouseSnapshot,
};
use replenish_planning::{
    ProjectedPoint, ProjectionQuery, ReorderPolicy, WarehouseReader, compute_projection,
};
use replenish_procurement::{OrderEvent, OrderId, OrderSnapshot};
use replenish_stock::ProductId;

use super::errors::ApiError;

/// The shared warehouse plus the configuration batches are started with.
#[derive(Debug)]
pub struct AppServices {
    warehouse: Arc<InMemoryWarehouse>,
    config: ReplenishmentConfig,
}

impl AppServices {
    pub fn new(warehouse: Arc<InMemoryWarehouse>, config: ReplenishmentConfig) -> Self {
        Self { warehouse, config }
    }

    /// Seed from `config.snapshot` when set, otherwise start empty.
    pub fn from_config(config: ReplenishmentConfig) -> Result<Self, WarehouseError> {
        let warehouse = match &config.snapshot {
            Some(path) => InMemoryWarehouse::load(path)?,
            None => InMemoryWarehouse::from_snapshot(WarehouseSnapshot::default())?,
        };
        Ok(Self::new(Arc::new(warehouse), config))
    }

    pub fn warehouse(&self) -> &Arc<InMemoryWarehouse> {
        &self.warehouse
    }

    pub fn config(&self) -> &ReplenishmentConfig {
        &self.config
    }

    pub fn projection(&self, query: &ProjectionQuery) -> Result<Vec<ProjectedPoint>, ApiError> {
        Ok(self
            .warehouse
            .read(|state| compute_projection(state, query))??)
    }

    pub fn policies(&self, filter: &PolicyFilter) -> Result<Vec<ReorderPolicy>, ApiError> {
        Ok(self.warehouse.policies(filter)?)
    }

    /// Orders of `product` (all products when `None`), open ones only unless `all`.
    pub fn orders(&self, product: Option<ProductId>, all: bool) -> Result<Vec<OrderSnapshot>, ApiError> {
        let select = |state: &WarehouseState| {
            state
                .all_orders()
                .filter(|o| product.is_none() || o.product() == product)
                .filter(|o| all || o.state().is_open())
                .filter_map(|o| o.snapshot())
                .collect::<Vec<_>>()
        };
        let mut orders = self.warehouse.read(select)?;
        orders.sort_by_key(|o| (o.date_planned, o.id));
        Ok(orders)
    }

    /// Set an open order's quantity; its pending moves follow the change.
    pub fn change_order_quantity(&self, id: OrderId, quantity: f64) -> Result<OrderSnapshot, ApiError> {
        let mut tx = self.warehouse.begin()?;
        tx.change_order_quantity(id, quantity)?;
        let order = tx
            .order(id)?
            .and_then(|o| o.snapshot())
            .ok_or_else(|| ApiError::Internal(format!("order {id} vanished during update")))?;
        tx.commit()?;
        Ok(order)
    }

    pub fn snapshot(&self) -> Result<WarehouseSnapshot, ApiError> {
        Ok(self.warehouse.export()?)
    }

    pub fn journal(&self) -> Result<Vec<EventEnvelope<OrderEvent>>, ApiError> {
        Ok(self.warehouse.journal()?)
    }

    /// Run a batch on the blocking pool; planning never yields.
    pub async fn run_replenishment(
        &self,
        filter: PolicyFilter,
        config: ReplenishmentConfig,
    ) -> Result<BatchReport, ApiError> {
        let scheduler = BatchScheduler::new(Arc::clone(&self.warehouse), &config);
        let report = tokio::task::spawn_blocking(move || scheduler.run(&filter))
            .await
            .map_err(|e| ApiError::Internal(format!("replenishment task failed: {e}")))??;
        Ok(report)
    }
}
