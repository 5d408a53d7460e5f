use serde::{Deserialize, Serialize};

use replenish_core::CompanyId;
use replenish_infra::{CommitMode, PolicyFilter, ReplenishmentConfig};
use replenish_planning::{EntryKind, ProjectedPoint, ProjectionQuery, ProjectionSort};
use replenish_stock::{LocationId, ProductId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ProjectionRequest {
    pub product: ProductId,
    pub location: LocationId,
    /// Empty means every kind.
    #[serde(default)]
    pub kinds: Vec<EntryKind>,
    #[serde(default)]
    pub sort: ProjectionSort,
    #[serde(default)]
    pub descending: bool,
    pub limit: Option<usize>,
}

impl ProjectionRequest {
    pub fn to_query(&self) -> ProjectionQuery {
        let mut query = ProjectionQuery::new(self.product, self.location)
            .sorted_by(self.sort, self.descending);
        if !self.kinds.is_empty() {
            query = query.kinds(self.kinds.iter().copied());
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        query
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunReplenishmentRequest {
    /// Restrict the run to these products.
    pub products: Option<Vec<ProductId>>,
    pub company: Option<CompanyId>,
    pub commit_mode: Option<CommitMode>,
    pub chunk_size: Option<usize>,
}

impl RunReplenishmentRequest {
    pub fn filter(&self) -> PolicyFilter {
        let mut filter = PolicyFilter::all();
        if let Some(products) = &self.products {
            filter = filter.products(products.iter().copied());
        }
        if let Some(company) = self.company {
            filter = filter.company(company);
        }
        filter
    }

    pub fn config(&self, base: &ReplenishmentConfig) -> Result<ReplenishmentConfig, String> {
        let mut config = base.clone();
        if let Some(mode) = self.commit_mode {
            config.commit_mode = mode;
        }
        match self.chunk_size {
            Some(0) => return Err("chunk_size must be at least 1".to_string()),
            Some(size) => config.chunk_size = size,
            None => {}
        }
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PolicyQuery {
    pub product: Option<ProductId>,
    pub company: Option<CompanyId>,
}

impl PolicyQuery {
    pub fn filter(&self) -> PolicyFilter {
        let mut filter = PolicyFilter::all();
        if let Some(product) = self.product {
            filter = filter.products([product]);
        }
        if let Some(company) = self.company {
            filter = filter.company(company);
        }
        filter
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub product: Option<ProductId>,
    /// Include done and cancelled orders.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangeQuantityRequest {
    pub quantity: f64,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ProjectionResponse {
    pub product: ProductId,
    pub location: LocationId,
    pub points: Vec<ProjectedPoint>,
}
