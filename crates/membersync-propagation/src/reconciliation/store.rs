//! Reconciliation store contract.
//!
//! Any backend (the in-memory reference store, or a table with conditional
//! writes) must provide these operations with the same guarantees:
//!
//! - `claim_record` is atomic: of N concurrent claimers exactly one wins.
//! - `fetch_due` never returns a record under an unexpired claim.
//! - `claim_record` re-checks the backoff under the same lock, so a stale
//!   fetch result cannot be claimed before the record is due again.
//! - A record lives in exactly one of {active, DLQ}; DLQ records are not
//!   mutated further.
//!
//! A durable backend keys rows by `id`, indexes `(provider, updated_at)` for
//! the due scan and keeps dead-lettered rows in a separate table.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::types::{FailedPropagation, ReconciliationStats};

/// Errors that can occur in a reconciliation store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No active record with this ID.
    #[error("Failed propagation not found: {id}")]
    NotFound { id: Uuid },

    /// Backend failure.
    #[error("Reconciliation store backend error: {message}")]
    Backend { message: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Queue of failed propagations with claim leasing and dead-lettering.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Insert a record into the active set and return its new ID.
    ///
    /// Stamps `created_at`/`updated_at` with the store's clock.
    async fn save_failed_propagation(&self, record: FailedPropagation) -> StoreResult<Uuid>;

    /// Up to `limit` active records that are unclaimed (or whose claim has
    /// expired) and whose backoff delay has elapsed. Order is unspecified.
    async fn fetch_due(&self, limit: usize) -> StoreResult<Vec<FailedPropagation>>;

    /// Take an exclusive lease on a record for `lease_seconds`.
    ///
    /// Returns `false` when another unexpired claim exists, the record's
    /// backoff delay has not elapsed, or the record is not active.
    async fn claim_record(&self, id: Uuid, worker_id: &str, lease_seconds: u64)
        -> StoreResult<bool>;

    /// Remove a record after a successful retry. Idempotent.
    async fn mark_success(&self, id: Uuid) -> StoreResult<()>;

    /// Count a failed retry. Dead-letters the record once attempts reach the
    /// store's maximum.
    async fn increment_attempt(&self, id: Uuid, last_error: Option<String>) -> StoreResult<()>;

    /// Move a record to the DLQ, appending `reason` to its last error.
    async fn mark_permanent_failure(&self, id: Uuid, reason: &str) -> StoreResult<()>;

    /// Current record counts.
    async fn get_stats(&self) -> StoreResult<ReconciliationStats>;

    /// Snapshot of dead-lettered records in insertion order.
    async fn get_dlq_entries(&self) -> StoreResult<Vec<FailedPropagation>>;
}
