//! Infrastructure layer: configuration, the in-memory warehouse, the job
//! system and the batch scheduler that drives replenishment planning.

pub mod batch;
pub mod config;
pub mod jobs;
pub mod warehouse;

pub use batch::{BatchError, BatchReport, BatchScheduler, CancellationToken, ChunkOutcome, ChunkStatus};
pub use config::{CommitMode, ConfigError, ReplenishmentConfig};
pub use warehouse::{InMemoryWarehouse, PolicyFilter, WarehouseError, WarehouseSnapshot};

#[cfg(test)]
mod testkit;
