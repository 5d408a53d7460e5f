//! Job executor: handler routing, retries and dead-lettering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobKind, JobResult, JobStatus};

pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    pub poll_interval: Duration,
    /// Thread name, also used in log fields.
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Handle to a background executor thread.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Stop after the job in flight, if any, and wait for the thread.
    ///
    /// Returns the final counters of the stopped executor.
    pub fn shutdown(mut self) -> ExecutorStats {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("job executor thread panicked");
            }
        }
        self.stats()
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub jobs_cancelled: u64,
}

impl ExecutorStats {
    /// Add the counters of another executor sharing the same store.
    pub fn merge(&mut self, other: &ExecutorStats) {
        self.jobs_processed += other.jobs_processed;
        self.jobs_succeeded += other.jobs_succeeded;
        self.jobs_failed += other.jobs_failed;
        self.jobs_dead_lettered += other.jobs_dead_lettered;
        self.jobs_cancelled += other.jobs_cancelled;
    }

    fn record(&mut self, job: &Job) {
        self.jobs_processed += 1;
        match job.status {
            JobStatus::Completed => self.jobs_succeeded += 1,
            JobStatus::DeadLettered { .. } => {
                self.jobs_failed += 1;
                self.jobs_dead_lettered += 1;
            }
            JobStatus::Cancelled => self.jobs_cancelled += 1,
            _ => self.jobs_failed += 1,
        }
    }
}

/// Runs claimed jobs through the handler registered for their kind.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a handler for a type name, a `prefix.*` category, or `*`.
    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Box::new(handler));
    }

    fn handler_for(&self, kind: &JobKind) -> Option<&JobHandler> {
        let type_name = kind.type_name();
        if let Some(handler) = self.handlers.get(type_name) {
            return Some(handler);
        }
        self.handlers
            .iter()
            .find(|(pattern, _)| {
                pattern
                    .strip_suffix(".*")
                    .is_some_and(|prefix| type_name.starts_with(prefix))
            })
            .map(|(_, handler)| handler)
            .or_else(|| self.handlers.get("*"))
    }

    /// Run one claimed job and persist its new status.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), JobStoreError> {
        let started = Utc::now();
        let result = match self.handler_for(&job.kind) {
            Some(handler) => handler(job),
            None => {
                warn!(job_id = %job.id, kind = job.kind.type_name(), "no handler for job");
                JobResult::Failure(format!("no handler for job kind {}", job.kind.type_name()))
            }
        };

        match result {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job)?;
                debug!(job_id = %job.id, attempt = job.attempt, "job completed");
            }
            JobResult::Cancelled => {
                job.mark_cancelled();
                self.store.update(job)?;
                info!(job_id = %job.id, "job cancelled");
            }
            JobResult::Failure(reason) => {
                job.mark_failed(reason.clone(), started);
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, attempts = job.attempt, error = %reason, "job dead-lettered");
                    self.store.dead_letter(job.clone(), reason)?;
                } else {
                    debug!(job_id = %job.id, attempt = job.attempt, error = %reason, "job failed, will retry");
                    self.store.update(job)?;
                }
            }
        }
        Ok(())
    }

    /// Execute ready jobs on the calling thread until none is left.
    ///
    /// Retries whose backoff has not elapsed yet are left in the store.
    pub fn drain(&self) -> Result<ExecutorStats, JobStoreError> {
        let mut stats = ExecutorStats::default();
        while let Some(mut job) = self.store.claim_next()? {
            self.execute_one(&mut job)?;
            stats.record(&job);
        }
        Ok(stats)
    }

    /// Poll the store from a background thread until shut down.
    pub fn spawn(self, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let thread_stats = Arc::clone(&stats);

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || executor_loop(self, config, shutdown_rx, thread_stats))?;

        Ok(JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "job executor started");
    let started = Instant::now();

    while shutdown_rx.try_recv().is_err() {
        match executor.store.claim_next() {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, kind = job.kind.type_name(), "claimed job");
                if let Err(e) = executor.execute_one(&mut job) {
                    error!(executor = %config.name, job_id = %job.id, error = %e, "failed to persist job outcome");
                }
                if let Ok(mut s) = stats.lock() {
                    s.record(&job);
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(
        executor = %config.name,
        uptime_secs = started.elapsed().as_secs(),
        "job executor stopped"
    );
}
