//! Batch scheduling of reorder policies.
//!
//! Policies are split into fixed-size chunks and each chunk becomes one
//! `replenishment.orderpoints` job. A chunk plans its policies one after the
//! other inside a warehouse transaction; a policy that fails on its own is
//! rolled back to its savepoint and logged, a transient failure fails the
//! whole chunk so the job system can retry it from scratch.
//!
//! Chunks touch disjoint products, so several executor threads may work the
//! same job queue; the run returns once the queue has settled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, info_span, warn};

use replenish_planning::{PlanReport, PlanningError, PolicyId, ReorderPolicy, ReplenishmentPlanner};
use replenish_stock::{LocationId, ProductId};

use crate::config::{CommitMode, ReplenishmentConfig};
use crate::jobs::{
    ExecutorStats, InMemoryJobStore, Job, JobExecutor, JobExecutorConfig, JobExecutorHandle,
    JobId, JobKind, JobResult, JobStore, JobStoreError, REPLENISHMENT_CHUNK, RetryPolicy,
};
use crate::warehouse::{InMemoryWarehouse, PolicyFilter, WarehouseError};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Jobs(#[from] JobStoreError),
    #[error("chunk payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("failed to start chunk worker: {0}")]
    Spawn(#[from] std::io::Error),
}

const WORKER_POLL: Duration = Duration::from_millis(5);

/// Cooperative cancellation, checked between policies.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkPayload {
    chunk: usize,
    policies: Vec<PolicyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkStatus {
    Committed,
    /// Rolled back; `error` is the failure of the last attempt.
    Failed { error: String },
    /// Stopped between two policies.
    Cancelled,
}

/// A policy that was skipped; the rest of its chunk went on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyFailure {
    pub policy: PolicyId,
    pub product: ProductId,
    pub location: LocationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub error: String,
}

/// Result of the last attempt at one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkOutcome {
    pub chunk: usize,
    pub job_id: JobId,
    pub attempts: u32,
    pub policies: usize,
    /// Reports of policies whose changes are committed.
    pub reports: Vec<PlanReport>,
    pub failures: Vec<PolicyFailure>,
    #[serde(flatten)]
    pub status: ChunkStatus,
}

impl ChunkOutcome {
    fn new(chunk: usize, job: &Job, policies: usize) -> Self {
        Self {
            chunk,
            job_id: job.id,
            attempts: job.attempt,
            policies,
            reports: Vec::new(),
            failures: Vec::new(),
            status: ChunkStatus::Committed,
        }
    }

    fn failed(mut self, err: impl std::fmt::Display) -> Self {
        self.status = ChunkStatus::Failed {
            error: err.to_string(),
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub policies: usize,
    pub chunks: Vec<ChunkOutcome>,
    pub jobs: ExecutorStats,
}

impl BatchReport {
    pub fn orders_created(&self) -> usize {
        self.committed_reports().map(|r| r.orders_created).sum()
    }

    pub fn orders_rescheduled(&self) -> usize {
        self.committed_reports().map(|r| r.orders_rescheduled).sum()
    }

    pub fn orders_removed(&self) -> usize {
        self.committed_reports().map(|r| r.orders_removed).sum()
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.chunks
            .iter()
            .filter(|c| matches!(c.status, ChunkStatus::Failed { .. }))
    }

    pub fn policy_failures(&self) -> impl Iterator<Item = &PolicyFailure> {
        self.chunks.iter().flat_map(|c| c.failures.iter())
    }

    fn committed_reports(&self) -> impl Iterator<Item = &PlanReport> {
        self.chunks.iter().flat_map(|c| c.reports.iter())
    }
}

/// Plans every selected reorder policy, one job per chunk.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    warehouse: Arc<InMemoryWarehouse>,
    planner: ReplenishmentPlanner,
    chunk_size: usize,
    commit_mode: CommitMode,
    chunk_retries: u32,
    workers: usize,
    cancel: CancellationToken,
}

impl BatchScheduler {
    pub fn new(warehouse: Arc<InMemoryWarehouse>, config: &ReplenishmentConfig) -> Self {
        Self {
            warehouse,
            planner: ReplenishmentPlanner::new(config.planner_settings()),
            chunk_size: config.chunk_size.max(1),
            commit_mode: config.commit_mode,
            chunk_retries: config.chunk_retries,
            workers: config.workers.max(1),
            cancel: CancellationToken::default(),
        }
    }

    pub fn with_planner(mut self, planner: ReplenishmentPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Token that stops the run at the next policy boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Plan the policies selected by `filter`.
    ///
    /// Chunks are independent: a failed chunk is reported and rolled back
    /// without affecting chunks committed before or after it.
    pub fn run(&self, filter: &PolicyFilter) -> Result<BatchReport, BatchError> {
        let policies = self.warehouse.policies(filter)?;
        let store = InMemoryJobStore::arc();
        let outcomes = Arc::new(Mutex::new(BTreeMap::new()));

        let worker = ChunkWorker {
            warehouse: Arc::clone(&self.warehouse),
            planner: self.planner.clone(),
            commit_mode: self.commit_mode,
            cancel: self.cancel.clone(),
            outcomes: Arc::clone(&outcomes),
        };

        let mut chunks: usize = 0;
        for (chunk, batch) in policies.chunks(self.chunk_size).enumerate() {
            let payload = serde_json::to_value(ChunkPayload {
                chunk,
                policies: batch.iter().map(|p| p.id).collect(),
            })?;
            store.enqueue(
                Job::new(JobKind::ReplenishmentChunk, payload)
                    .with_retry_policy(RetryPolicy::immediate(self.chunk_retries)),
            )?;
            chunks += 1;
        }
        info!(
            policies = policies.len(),
            chunks,
            chunk_size = self.chunk_size,
            commit_mode = ?self.commit_mode,
            workers = self.workers.min(chunks.max(1)),
            "dispatching replenishment chunks"
        );

        let jobs = if self.workers <= 1 || chunks <= 1 {
            chunk_executor(&store, worker).drain()?
        } else {
            self.run_workers(&store, &worker, self.workers.min(chunks))?
        };
        let chunks: Vec<ChunkOutcome> = outcomes
            .lock()
            .map_err(|_| JobStoreError::Storage("chunk outcome lock poisoned".to_string()))?
            .values()
            .cloned()
            .collect();

        let report = BatchReport {
            policies: policies.len(),
            chunks,
            jobs,
        };
        info!(
            orders_created = report.orders_created(),
            orders_rescheduled = report.orders_rescheduled(),
            orders_removed = report.orders_removed(),
            failed_chunks = report.failed_chunks().count(),
            "replenishment batch finished"
        );
        Ok(report)
    }

    /// Work the queue from `workers` executor threads and wait until it settles.
    fn run_workers(
        &self,
        store: &Arc<InMemoryJobStore>,
        worker: &ChunkWorker,
        workers: usize,
    ) -> Result<ExecutorStats, BatchError> {
        let mut handles: Vec<JobExecutorHandle> = Vec::with_capacity(workers);
        for n in 0..workers {
            let config = JobExecutorConfig {
                poll_interval: WORKER_POLL,
                ..JobExecutorConfig::default().with_name(format!("replenishment-worker-{n}"))
            };
            match chunk_executor(store, worker.clone()).spawn(config) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(worker = n, error = %e, "failed to start chunk worker");
                    for handle in handles {
                        handle.shutdown();
                    }
                    return Err(e.into());
                }
            }
        }

        let settled = wait_until_settled(store);
        let mut stats = ExecutorStats::default();
        for handle in handles {
            stats.merge(&handle.shutdown());
        }
        settled?;
        Ok(stats)
    }
}

fn chunk_executor(store: &Arc<InMemoryJobStore>, worker: ChunkWorker) -> JobExecutor<Arc<InMemoryJobStore>> {
    let mut executor = JobExecutor::new(Arc::clone(store));
    executor.register_handler(REPLENISHMENT_CHUNK, move |job| worker.handle(job));
    executor
}

fn wait_until_settled(store: &InMemoryJobStore) -> Result<(), JobStoreError> {
    while !store.stats()?.is_settled() {
        thread::sleep(WORKER_POLL);
    }
    Ok(())
}

#[derive(Clone)]
struct ChunkWorker {
    warehouse: Arc<InMemoryWarehouse>,
    planner: ReplenishmentPlanner,
    commit_mode: CommitMode,
    cancel: CancellationToken,
    outcomes: Arc<Mutex<BTreeMap<usize, ChunkOutcome>>>,
}

impl ChunkWorker {
    fn handle(&self, job: &Job) -> JobResult {
        let payload: ChunkPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return JobResult::Failure(format!("invalid chunk payload: {e}")),
        };
        let span = info_span!("replenishment_chunk", chunk = payload.chunk, attempt = job.attempt);
        let _enter = span.enter();

        let outcome = self.run_chunk(job, &payload);
        let result = match &outcome.status {
            ChunkStatus::Committed => JobResult::Success,
            ChunkStatus::Cancelled => JobResult::Cancelled,
            ChunkStatus::Failed { error } => {
                error!(chunk = payload.chunk, attempt = job.attempt, error = %error, "chunk rolled back");
                JobResult::Failure(error.clone())
            }
        };
        match self.outcomes.lock() {
            Ok(mut outcomes) => {
                outcomes.insert(payload.chunk, outcome);
            }
            Err(_) => error!(chunk = payload.chunk, "chunk outcome lock poisoned"),
        }
        result
    }

    fn run_chunk(&self, job: &Job, payload: &ChunkPayload) -> ChunkOutcome {
        let outcome = ChunkOutcome::new(payload.chunk, job, payload.policies.len());
        let policies = match self.warehouse.read(|state| {
            payload
                .policies
                .iter()
                .filter_map(|id| state.policy(*id).cloned())
                .collect::<Vec<_>>()
        }) {
            Ok(policies) => policies,
            Err(e) => return outcome.failed(e),
        };
        if policies.len() < payload.policies.len() {
            warn!(
                chunk = payload.chunk,
                missing = payload.policies.len() - policies.len(),
                "policies removed since the chunk was scheduled"
            );
        }

        match self.commit_mode {
            CommitMode::Chunk => self.commit_once(outcome, &policies),
            CommitMode::Policy => self.commit_each(outcome, &policies),
        }
    }

    /// One transaction for the whole chunk, one savepoint per policy.
    fn commit_once(&self, mut outcome: ChunkOutcome, policies: &[ReorderPolicy]) -> ChunkOutcome {
        let mut tx = match self.warehouse.begin() {
            Ok(tx) => tx,
            Err(e) => return outcome.failed(e),
        };
        for policy in policies {
            if self.cancel.is_cancelled() {
                tx.rollback();
                info!(chunk = outcome.chunk, "chunk cancelled, uncommitted work discarded");
                outcome.reports.clear();
                outcome.status = ChunkStatus::Cancelled;
                return outcome;
            }
            let savepoint = tx.savepoint();
            match self.planner.process(&mut tx, policy) {
                Ok(report) => outcome.reports.push(report),
                Err(err) if err.is_transient() => {
                    tx.rollback();
                    return outcome.failed(err);
                }
                Err(err) => {
                    tx.rollback_to(savepoint);
                    outcome.failures.push(policy_failed(outcome.chunk, policy, &err));
                }
            }
        }
        match tx.commit() {
            Ok(events) => {
                info!(chunk = outcome.chunk, events, "chunk committed");
                outcome
            }
            Err(e) => outcome.failed(e),
        }
    }

    /// One transaction per policy; committed policies survive a later failure.
    fn commit_each(&self, mut outcome: ChunkOutcome, policies: &[ReorderPolicy]) -> ChunkOutcome {
        for policy in policies {
            if self.cancel.is_cancelled() {
                info!(chunk = outcome.chunk, committed = outcome.reports.len(), "chunk cancelled");
                outcome.status = ChunkStatus::Cancelled;
                return outcome;
            }
            let mut tx = match self.warehouse.begin() {
                Ok(tx) => tx,
                Err(e) => return outcome.failed(e),
            };
            match self.planner.process(&mut tx, policy) {
                Ok(report) => match tx.commit() {
                    Ok(_) => outcome.reports.push(report),
                    Err(e) => return outcome.failed(e),
                },
                Err(err) if err.is_transient() => {
                    tx.rollback();
                    return outcome.failed(err);
                }
                Err(err) => {
                    tx.rollback();
                    outcome.failures.push(policy_failed(outcome.chunk, policy, &err));
                }
            }
        }
        outcome
    }
}

fn policy_failed(chunk: usize, policy: &ReorderPolicy, err: &PlanningError) -> PolicyFailure {
    let date = match err {
        PlanningError::Convergence { date, .. } => Some(*date),
        _ => None,
    };
    warn!(
        chunk,
        policy = %policy.id,
        product = %policy.product,
        location = %policy.location,
        date = ?date,
        error = %err,
        "reorder policy skipped"
    );
    PolicyFailure {
        policy: policy.id,
        product: policy.product,
        location: policy.location,
        date,
        error: err.to_string(),
    }
}
