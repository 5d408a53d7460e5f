//! Background job system with retry, backoff, and dead-letter handling.
//!
//! Replenishment chunks are dispatched as jobs: each chunk is an independent
//! unit of work with its own retry budget, and chunks that run out of attempts
//! land in the dead-letter queue for inspection or replay.
//!
//! - `Job`: kind, JSON payload, status and attempt history
//! - `JobStore`: persistence (in-memory here)
//! - `JobExecutor`: routes jobs to handlers, either draining the queue on the
//!   calling thread or polling from a background thread

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus,
    REPLENISHMENT_CHUNK, RetryPolicy,
};
