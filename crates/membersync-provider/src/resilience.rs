//! Circuit breaking for secondary provider calls.
//!
//! Each provider gets an independent breaker. A provider that keeps failing
//! is cut off for a cool-down period so it neither slows down membership
//! operations nor floods the reconciliation store with doomed retries.
//!
//! ```text
//! Closed ──(failure_threshold consecutive failures)──► Open
//! Open ──(timeout elapsed)──► HalfOpen
//! HalfOpen ──(probe succeeds)──► Closed
//! HalfOpen ──(probe fails)──► Open
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::types::CircuitState;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before allowing probes.
    pub timeout_secs: u64,
    /// Maximum number of concurrent probe calls while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the open timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the half-open probe limit.
    #[must_use]
    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls.max(1);
        self
    }

    /// Open timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Circuit breaker for a single provider.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    half_open_probes_in_flight: u32,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    /// Create a new closed circuit breaker.
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_probes_in_flight: 0,
            last_failure_at: None,
            last_success_at: None,
        }
    }

    /// Provider this breaker protects.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Current consecutive failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// When the circuit last opened.
    #[must_use]
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Probe calls currently admitted while half-open.
    #[must_use]
    pub fn half_open_probes_in_flight(&self) -> u32 {
        self.half_open_probes_in_flight
    }

    /// State as observed at `now`, without mutating the breaker.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> CircuitState {
        match self.state {
            CircuitState::Open if self.timeout_elapsed(now) => CircuitState::HalfOpen,
            state => state,
        }
    }

    fn timeout_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.opened_at {
            Some(opened_at) => {
                now.signed_duration_since(opened_at).num_seconds()
                    >= i64::try_from(self.config.timeout_secs).unwrap_or(i64::MAX)
            }
            None => true,
        }
    }

    /// Ask to make a call at `now`.
    ///
    /// Returns `false` when the call must be rejected. A `true` answer while
    /// half-open reserves a probe slot that is released by
    /// [`record_success`](Self::record_success),
    /// [`record_failure`](Self::record_failure) or
    /// [`release_probe`](Self::release_probe).
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == CircuitState::Open {
            if !self.timeout_elapsed(now) {
                return false;
            }
            self.state = CircuitState::HalfOpen;
            self.half_open_probes_in_flight = 0;
            tracing::info!(
                target: "circuit_breaker",
                provider = %self.provider,
                "Circuit breaker transitioning to half-open"
            );
        }

        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if self.half_open_probes_in_flight < self.config.half_open_max_calls {
                    self.half_open_probes_in_flight += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => false,
        }
    }

    /// Give back a probe slot without reporting an outcome.
    pub fn release_probe(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.half_open_probes_in_flight = self.half_open_probes_in_flight.saturating_sub(1);
        }
    }

    /// Record a successful call.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_success_at = Some(now);

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.consecutive_failures = 0;
                self.opened_at = None;
                self.half_open_probes_in_flight = 0;
                tracing::info!(
                    target: "circuit_breaker",
                    provider = %self.provider,
                    "Circuit breaker closed after successful probe"
                );
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened finished late.
                tracing::debug!(
                    target: "circuit_breaker",
                    provider = %self.provider,
                    "Ignoring late success while circuit is open"
                );
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.last_failure_at = Some(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                    tracing::warn!(
                        target: "circuit_breaker",
                        provider = %self.provider,
                        failure_count = self.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opened due to consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                self.half_open_probes_in_flight = 0;
                tracing::warn!(
                    target: "circuit_breaker",
                    provider = %self.provider,
                    "Circuit breaker reopened after failed probe"
                );
            }
            CircuitState::Open => {}
        }
    }

    /// Snapshot of the breaker at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            provider: self.provider.clone(),
            state: self.state_at(now),
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at,
            half_open_probes_in_flight: self.half_open_probes_in_flight,
            last_failure_at: self.last_failure_at,
            last_success_at: self.last_success_at,
        }
    }
}

/// Status information for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub provider: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub half_open_probes_in_flight: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Breakers for every provider, created on first reference.
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    /// Create a registry using the wall clock.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry with an explicit time source.
    #[must_use]
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            config,
            clock,
        }
    }

    /// Configuration applied to new breakers.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask whether a call to `provider` may go out now.
    pub async fn allow_request(&self, provider: &str) -> bool {
        let now = self.clock.now();
        let mut breakers = self.breakers.write().await;
        self.entry(&mut breakers, provider).try_acquire(now)
    }

    /// Record a successful call to `provider`.
    pub async fn record_success(&self, provider: &str) {
        let now = self.clock.now();
        let mut breakers = self.breakers.write().await;
        self.entry(&mut breakers, provider).record_success(now);
    }

    /// Record a failed call to `provider`.
    pub async fn record_failure(&self, provider: &str) {
        let now = self.clock.now();
        let mut breakers = self.breakers.write().await;
        self.entry(&mut breakers, provider).record_failure(now);
    }

    /// Give back a probe slot reserved by [`allow_request`](Self::allow_request)
    /// when the call was not made.
    pub async fn release_probe(&self, provider: &str) {
        let mut breakers = self.breakers.write().await;
        if let Some(breaker) = breakers.get_mut(provider) {
            breaker.release_probe();
        }
    }

    /// Current state of `provider`'s breaker.
    pub async fn state(&self, provider: &str) -> CircuitState {
        self.status(provider).await.state
    }

    /// Status snapshot for `provider`, creating its breaker if needed.
    pub async fn status(&self, provider: &str) -> CircuitBreakerStatus {
        let now = self.clock.now();
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(provider) {
                return breaker.status_at(now);
            }
        }

        let mut breakers = self.breakers.write().await;
        self.entry(&mut breakers, provider).status_at(now)
    }

    /// Status snapshots for every known breaker, ordered by provider.
    pub async fn all_statuses(&self) -> Vec<CircuitBreakerStatus> {
        let now = self.clock.now();
        let breakers = self.breakers.read().await;
        let mut statuses: Vec<CircuitBreakerStatus> =
            breakers.values().map(|b| b.status_at(now)).collect();
        statuses.sort_by(|a, b| a.provider.cmp(&b.provider));
        statuses
    }

    fn entry<'a>(
        &self,
        breakers: &'a mut HashMap<String, CircuitBreaker>,
        provider: &str,
    ) -> &'a mut CircuitBreaker {
        breakers
            .entry(provider.to_string())
            .or_insert_with(|| CircuitBreaker::new(provider, self.config.clone()))
    }
}
