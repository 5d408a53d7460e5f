//! Runtime configuration for batch replenishment runs.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replenish_planning::PlannerSettings;

pub const ENV_CHUNK_SIZE: &str = "REPLENISH_CHUNK_SIZE";
pub const ENV_HORIZON_HOURS: &str = "REPLENISH_HORIZON_HOURS";
pub const ENV_MAX_ITERATIONS: &str = "REPLENISH_MAX_ITERATIONS";
pub const ENV_COMMIT_MODE: &str = "REPLENISH_COMMIT_MODE";
pub const ENV_CHUNK_RETRIES: &str = "REPLENISH_CHUNK_RETRIES";
pub const ENV_SNAPSHOT: &str = "REPLENISH_SNAPSHOT";
pub const ENV_WORKERS: &str = "REPLENISH_WORKERS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Commit granularity of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// One commit at the end of the chunk; any chunk-level failure discards all of it.
    #[default]
    Chunk,
    /// Commit after every policy; a retry only redoes the policies after the last checkpoint.
    Policy,
}

impl FromStr for CommitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chunk" => Ok(Self::Chunk),
            "policy" => Ok(Self::Policy),
            other => Err(format!("expected `chunk` or `policy`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplenishmentConfig {
    pub chunk_size: usize,
    pub horizon: Duration,
    pub max_iterations: usize,
    pub commit_mode: CommitMode,
    /// Extra attempts for a chunk after a transient failure.
    pub chunk_retries: u32,
    /// Executor threads a batch runs its chunks on; 1 runs them on the caller's thread.
    pub workers: usize,
    /// JSON warehouse snapshot to seed the in-memory store with.
    pub snapshot: Option<PathBuf>,
}

impl Default for ReplenishmentConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            horizon: Duration::hours(24),
            max_iterations: 500,
            commit_mode: CommitMode::Chunk,
            chunk_retries: 3,
            workers: 4,
            snapshot: None,
        }
    }
}

impl ReplenishmentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup; unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_CHUNK_SIZE) {
            config.chunk_size = parse(ENV_CHUNK_SIZE, &raw)?;
            if config.chunk_size == 0 {
                return Err(ConfigError::invalid(ENV_CHUNK_SIZE, &raw, "must be at least 1"));
            }
        }
        if let Some(raw) = lookup(ENV_HORIZON_HOURS) {
            let hours: i64 = parse(ENV_HORIZON_HOURS, &raw)?;
            if hours < 0 {
                return Err(ConfigError::invalid(ENV_HORIZON_HOURS, &raw, "must not be negative"));
            }
            config.horizon = Duration::hours(hours);
        }
        if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
            config.max_iterations = parse(ENV_MAX_ITERATIONS, &raw)?;
            if config.max_iterations == 0 {
                return Err(ConfigError::invalid(ENV_MAX_ITERATIONS, &raw, "must be at least 1"));
            }
        }
        if let Some(raw) = lookup(ENV_COMMIT_MODE) {
            config.commit_mode = raw
                .parse()
                .map_err(|reason: String| ConfigError::invalid(ENV_COMMIT_MODE, &raw, reason))?;
        }
        if let Some(raw) = lookup(ENV_CHUNK_RETRIES) {
            config.chunk_retries = parse(ENV_CHUNK_RETRIES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_WORKERS) {
            config.workers = parse(ENV_WORKERS, &raw)?;
            if config.workers == 0 {
                return Err(ConfigError::invalid(ENV_WORKERS, &raw, "must be at least 1"));
            }
        }
        if let Some(raw) = lookup(ENV_SNAPSHOT) {
            if !raw.trim().is_empty() {
                config.snapshot = Some(PathBuf::from(raw.trim()));
            }
        }

        Ok(config)
    }

    /// Planner tunables derived from this configuration.
    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            horizon: self.horizon,
            max_iterations: self.max_iterations,
            ..PlannerSettings::default()
        }
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, raw, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ReplenishmentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ReplenishmentConfig::default());
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.planner_settings(), PlannerSettings::default());
    }

    #[test]
    fn reads_every_key() {
        let config = ReplenishmentConfig::from_lookup(lookup(&[
            (ENV_CHUNK_SIZE, "10"),
            (ENV_HORIZON_HOURS, "48"),
            (ENV_MAX_ITERATIONS, "20"),
            (ENV_COMMIT_MODE, "Policy"),
            (ENV_CHUNK_RETRIES, "0"),
            (ENV_WORKERS, "8"),
            (ENV_SNAPSHOT, "/tmp/seed.json"),
        ]))
        .unwrap();

        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.horizon, Duration::hours(48));
        assert_eq!(config.commit_mode, CommitMode::Policy);
        assert_eq!(config.chunk_retries, 0);
        assert_eq!(config.workers, 8);
        assert_eq!(config.snapshot, Some(PathBuf::from("/tmp/seed.json")));

        let settings = config.planner_settings();
        assert_eq!(settings.horizon, Duration::hours(48));
        assert_eq!(settings.max_iterations, 20);
        assert_eq!(settings.time_unit, Duration::seconds(1));
    }

    #[test]
    fn rejects_malformed_values() {
        let err = ReplenishmentConfig::from_lookup(lookup(&[(ENV_CHUNK_SIZE, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_CHUNK_SIZE, .. }));

        let err = ReplenishmentConfig::from_lookup(lookup(&[(ENV_CHUNK_SIZE, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_CHUNK_SIZE, .. }));

        let err = ReplenishmentConfig::from_lookup(lookup(&[(ENV_WORKERS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_WORKERS, .. }));

        let err = ReplenishmentConfig::from_lookup(lookup(&[(ENV_COMMIT_MODE, "never")])).unwrap_err();
        assert!(err.to_string().contains("REPLENISH_COMMIT_MODE"));
    }
}
