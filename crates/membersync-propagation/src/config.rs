//! Propagation configuration loaded from environment variables.
//!
//! Every variable is optional; unset variables fall back to defaults and
//! malformed values fail fast with [`ConfigError::InvalidValue`].

use std::env::VarError;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use membersync_provider::CircuitBreakerConfig;

use crate::reconciliation::StoreConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Reject membership changes without a justification.
    pub require_justification: bool,
    /// Minimum justification length (after trimming) when required.
    pub min_justification_length: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            require_justification: true,
            min_justification_length: 10,
        }
    }
}

/// Reconciliation worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Identifier recorded on claims.
    pub worker_id: String,
    /// Delay between polls of the store.
    pub poll_interval: Duration,
    /// Maximum records fetched per poll.
    pub batch_size: usize,
    /// Claim lease length in seconds.
    pub lease_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(30),
            batch_size: 25,
            lease_seconds: 300,
        }
    }
}

/// All propagation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationConfig {
    pub orchestrator: OrchestratorConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
}

impl PropagationConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let defaults = Self::default();

        let orchestrator = OrchestratorConfig {
            require_justification: parse_or(
                &reader,
                "MEMBERSYNC_REQUIRE_JUSTIFICATION",
                defaults.orchestrator.require_justification,
            )?,
            min_justification_length: parse_or(
                &reader,
                "MEMBERSYNC_MIN_JUSTIFICATION_LENGTH",
                defaults.orchestrator.min_justification_length,
            )?,
        };

        let circuit_breaker = CircuitBreakerConfig::default()
            .with_failure_threshold(parse_nonzero(
                &reader,
                "MEMBERSYNC_CB_FAILURE_THRESHOLD",
                defaults.circuit_breaker.failure_threshold,
            )?)
            .with_timeout_secs(parse_or(
                &reader,
                "MEMBERSYNC_CB_TIMEOUT_SECS",
                defaults.circuit_breaker.timeout_secs,
            )?)
            .with_half_open_max_calls(parse_nonzero(
                &reader,
                "MEMBERSYNC_CB_HALF_OPEN_MAX_CALLS",
                defaults.circuit_breaker.half_open_max_calls,
            )?);

        let max_attempts =
            parse_nonzero(&reader, "MEMBERSYNC_MAX_ATTEMPTS", defaults.store.max_attempts)?;

        let worker = WorkerConfig {
            worker_id: reader("MEMBERSYNC_WORKER_ID").unwrap_or(defaults.worker.worker_id),
            poll_interval: Duration::from_secs(parse_nonzero(
                &reader,
                "MEMBERSYNC_WORKER_POLL_INTERVAL_SECS",
                defaults.worker.poll_interval.as_secs(),
            )?),
            batch_size: parse_or(
                &reader,
                "MEMBERSYNC_WORKER_BATCH_SIZE",
                defaults.worker.batch_size,
            )?,
            lease_seconds: parse_or(
                &reader,
                "MEMBERSYNC_WORKER_LEASE_SECS",
                defaults.worker.lease_seconds,
            )?,
        };

        Ok(Self {
            orchestrator,
            circuit_breaker,
            store: StoreConfig { max_attempts },
            worker,
        })
    }
}

fn parse_or<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue(
            key.to_string(),
            "not valid unicode".to_string(),
        )),
    }
}

/// Like [`parse_or`], but rejects an explicit zero.
fn parse_nonzero<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value = parse_or(reader, key, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(value)
}
