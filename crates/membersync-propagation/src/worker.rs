//! Reconciliation Worker
//!
//! Background worker that retries failed propagations from the
//! reconciliation store. Several workers may share one store; claims keep
//! them from processing the same record at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use membersync_provider::{
    CircuitBreakerRegistry, GroupMapper, OperationMeta, OperationStatus, ProviderRegistry,
};

use crate::config::WorkerConfig;
use crate::orchestrator::call_provider;
use crate::reconciliation::{FailedPropagation, ReconciliationStore};

/// Counters for one pass over the due records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerRunSummary {
    /// Records returned by `fetch_due`.
    pub fetched: usize,
    /// Records this worker claimed.
    pub claimed: usize,
    /// Records whose claim was taken by another worker.
    pub skipped: usize,
    /// Retries that succeeded.
    pub succeeded: usize,
    /// Failed retries recorded against the attempt budget. A record whose
    /// budget runs out moves to the DLQ inside the store.
    pub retried: usize,
    /// Records this pass sent straight to the DLQ.
    pub dead_lettered: usize,
    /// Records left untouched because the provider's circuit is open.
    pub deferred: usize,
    /// Store operations that failed.
    pub errors: usize,
}

/// What happened to a single claimed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Succeeded,
    Retried,
    DeadLettered,
    Deferred,
    StoreFailed,
}

/// Periodic consumer of the reconciliation store.
pub struct ReconciliationWorker {
    registry: Arc<ProviderRegistry>,
    mapper: Arc<dyn GroupMapper>,
    store: Arc<dyn ReconciliationStore>,
    breakers: CircuitBreakerRegistry,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl std::fmt::Debug for ReconciliationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationWorker")
            .field("config", &self.config)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl ReconciliationWorker {
    /// Create a new worker.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        mapper: Arc<dyn GroupMapper>,
        store: Arc<dyn ReconciliationStore>,
        breakers: CircuitBreakerRegistry,
        config: WorkerConfig,
    ) -> Self {
        Self {
            registry,
            mapper,
            store,
            breakers,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    /// Worker configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Start the worker. Returns once [`shutdown`](Self::shutdown) is called.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            lease_seconds = self.config.lease_seconds,
            "Starting reconciliation worker"
        );

        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.is_shutdown() {
                break;
            }
            tokio::select! {
                _ = poll_interval.tick() => {
                    if self.is_shutdown() {
                        break;
                    }
                    let summary = self.run_once().await;
                    if summary.fetched > 0 {
                        info!(
                            fetched = summary.fetched,
                            succeeded = summary.succeeded,
                            retried = summary.retried,
                            dead_lettered = summary.dead_lettered,
                            deferred = summary.deferred,
                            skipped = summary.skipped,
                            "Reconciliation pass complete"
                        );
                    }
                }
                () = self.shutdown_notify.notified() => {}
            }
        }

        info!("Worker stopped");
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        info!(worker_id = %self.config.worker_id, "Shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_one();
    }

    /// Check if shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Process one batch of due records.
    pub async fn run_once(&self) -> WorkerRunSummary {
        let mut summary = WorkerRunSummary::default();

        let records = match self.store.fetch_due(self.config.batch_size).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to fetch due propagations");
                summary.errors += 1;
                return summary;
            }
        };

        summary.fetched = records.len();
        if records.is_empty() {
            return summary;
        }
        debug!(count = records.len(), "Fetched due propagations");

        for record in records {
            let Some(id) = record.id else {
                continue;
            };

            match self
                .store
                .claim_record(id, &self.config.worker_id, self.config.lease_seconds)
                .await
            {
                Ok(true) => summary.claimed += 1,
                Ok(false) => {
                    debug!(record_id = %id, "Record claimed elsewhere, skipping");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(record_id = %id, error = %e, "Failed to claim record");
                    summary.errors += 1;
                    continue;
                }
            }

            match self.process_record(id, &record).await {
                RecordOutcome::Succeeded => summary.succeeded += 1,
                RecordOutcome::Retried => summary.retried += 1,
                RecordOutcome::DeadLettered => summary.dead_lettered += 1,
                RecordOutcome::Deferred => summary.deferred += 1,
                RecordOutcome::StoreFailed => summary.errors += 1,
            }
        }

        summary
    }

    #[instrument(
        skip(self, record),
        fields(provider = %record.provider, action = %record.action, attempts = record.attempts)
    )]
    async fn process_record(&self, id: Uuid, record: &FailedPropagation) -> RecordOutcome {
        let Some(provider) = self.registry.get_provider(&record.provider) else {
            return self
                .dead_letter(id, &format!("unknown provider: {}", record.provider))
                .await;
        };

        let Some(member_email) = record.member_email() else {
            return self.dead_letter(id, "payload missing member_email").await;
        };

        if !self.breakers.allow_request(&record.provider).await {
            debug!(
                target: "circuit_breaker",
                record_id = %id,
                "Circuit open, leaving claim to expire"
            );
            return RecordOutcome::Deferred;
        }

        // The mapping may have been removed since the record was queued.
        let mapped = self
            .mapper
            .map_primary_to_secondary_group(&record.group_id, &record.provider)
            .await;
        let Some(group_id) = mapped.or_else(|| record.secondary_group_id().map(str::to_string))
        else {
            self.breakers.release_probe(&record.provider).await;
            return self
                .dead_letter(id, &format!("no group mapping for {}", record.group_id))
                .await;
        };

        let meta = OperationMeta {
            correlation_id: record.correlation_id.clone(),
            justification: record.justification.clone(),
        };

        match call_provider(provider.as_ref(), record.action, &group_id, member_email, &meta).await
        {
            Ok(result) => match result.status() {
                OperationStatus::Success => {
                    self.breakers.record_success(&record.provider).await;
                    match self.store.mark_success(id).await {
                        Ok(()) => {
                            info!(record_id = %id, "Propagation reconciled");
                            RecordOutcome::Succeeded
                        }
                        Err(e) => {
                            error!(record_id = %id, error = %e, "Failed to mark success");
                            RecordOutcome::StoreFailed
                        }
                    }
                }
                OperationStatus::TransientError => {
                    self.breakers.record_failure(&record.provider).await;
                    self.retry_later(id, result.describe()).await
                }
                OperationStatus::PermanentError => {
                    self.breakers.record_failure(&record.provider).await;
                    self.dead_letter(id, &result.describe()).await
                }
            },
            Err(e) => {
                self.breakers.record_failure(&record.provider).await;
                self.retry_later(id, e.to_string()).await
            }
        }
    }

    async fn retry_later(&self, id: Uuid, error: String) -> RecordOutcome {
        match self.store.increment_attempt(id, Some(error.clone())).await {
            Ok(()) => {
                warn!(record_id = %id, error = %error, "Retry failed, will try again after backoff");
                RecordOutcome::Retried
            }
            Err(e) => {
                error!(record_id = %id, error = %e, "Failed to record attempt");
                RecordOutcome::StoreFailed
            }
        }
    }

    async fn dead_letter(&self, id: Uuid, reason: &str) -> RecordOutcome {
        match self.store.mark_permanent_failure(id, reason).await {
            Ok(()) => {
                warn!(record_id = %id, reason = %reason, "Propagation dead-lettered");
                RecordOutcome::DeadLettered
            }
            Err(e) => {
                error!(record_id = %id, error = %e, "Failed to dead-letter record");
                RecordOutcome::StoreFailed
            }
        }
    }
}
