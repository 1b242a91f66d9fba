//! In-memory reference implementation of [`ReconciliationStore`].
//!
//! A single mutex guards the active set, the claim table and the DLQ so that
//! claim checks and due filtering always observe one consistent snapshot.
//! Nothing survives a process restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use membersync_provider::{Clock, SystemClock};

use super::backoff::backoff_delay_secs;
use super::store::{ReconciliationStore, StoreError, StoreResult};
use super::types::{FailedPropagation, PropagationStatus, ReconciliationStats};

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Failed retries after which a record is dead-lettered.
    pub max_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Exclusive retry lease on a record. Kept apart from the record so that a
/// crashed worker's lease simply runs out.
#[derive(Debug, Clone)]
struct Claim {
    worker_id: String,
    expires_at: DateTime<Utc>,
}

impl Claim {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A record is due once its backoff delay has passed since the last update.
fn is_due(record: &FailedPropagation, now: DateTime<Utc>) -> bool {
    let waited = now.signed_duration_since(record.updated_at).num_seconds();
    waited >= i64::try_from(backoff_delay_secs(record.attempts)).unwrap_or(i64::MAX)
}

#[derive(Debug, Default)]
struct StoreState {
    active: HashMap<Uuid, FailedPropagation>,
    claims: HashMap<Uuid, Claim>,
    dlq: Vec<FailedPropagation>,
}

impl StoreState {
    fn has_valid_claim(&self, id: &Uuid, now: DateTime<Utc>) -> bool {
        self.claims.get(id).is_some_and(|c| c.is_valid_at(now))
    }

    /// Shared dead-letter path for explicit permanent failures and attempt
    /// exhaustion.
    fn move_to_dlq(&mut self, id: Uuid, reason: &str, now: DateTime<Utc>) -> StoreResult<()> {
        let mut record = self.active.remove(&id).ok_or(StoreError::NotFound { id })?;
        self.claims.remove(&id);

        record.op_status = PropagationStatus::PermanentError;
        record.last_error = Some(match record.last_error.take() {
            Some(previous) if !previous.is_empty() => format!("{previous} | {reason}"),
            _ => reason.to_string(),
        });
        record.updated_at = now;

        info!(
            target: "dlq",
            record_id = %id,
            provider = %record.provider,
            action = %record.action,
            attempts = record.attempts,
            reason = %reason,
            "Failed propagation moved to dead letter queue"
        );

        self.dlq.push(record);
        Ok(())
    }
}

/// Mutex-guarded in-memory reconciliation store.
#[derive(Debug)]
pub struct InMemoryReconciliationStore {
    state: Mutex<StoreState>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
}

impl InMemoryReconciliationStore {
    /// Create a store using the wall clock.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store with an explicit time source.
    #[must_use]
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            config,
            clock,
        }
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Worker currently holding an unexpired claim on `id`, if any.
    pub async fn claim_holder(&self, id: Uuid) -> Option<String> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        state
            .claims
            .get(&id)
            .filter(|c| c.is_valid_at(now))
            .map(|c| c.worker_id.clone())
    }
}

impl Default for InMemoryReconciliationStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryReconciliationStore {
    async fn save_failed_propagation(&self, mut record: FailedPropagation) -> StoreResult<Uuid> {
        let now = self.clock.now();
        let id = Uuid::new_v4();

        record.id = Some(id);
        record.op_status = PropagationStatus::RetryableError;
        record.created_at = now;
        record.updated_at = now;

        debug!(
            record_id = %id,
            provider = %record.provider,
            action = %record.action,
            group_id = %record.group_id,
            "Saved failed propagation"
        );

        let mut state = self.state.lock().await;
        state.active.insert(id, record);
        Ok(id)
    }

    async fn fetch_due(&self, limit: usize) -> StoreResult<Vec<FailedPropagation>> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        state.claims.retain(|_, claim| claim.is_valid_at(now));

        let due: Vec<FailedPropagation> = state
            .active
            .iter()
            .filter(|(id, _)| !state.has_valid_claim(id, now))
            .filter(|(_, record)| is_due(record, now))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect();

        Ok(due)
    }

    async fn claim_record(
        &self,
        id: Uuid,
        worker_id: &str,
        lease_seconds: u64,
    ) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let Some(record) = state.active.get(&id) else {
            debug!(record_id = %id, worker_id, "Claim refused: record not active");
            return Ok(false);
        };
        // A caller may hold a fetch result from before another worker's
        // failed retry refreshed `updated_at`.
        if !is_due(record, now) {
            debug!(
                record_id = %id,
                worker_id,
                attempts = record.attempts,
                "Claim refused: backoff not elapsed"
            );
            return Ok(false);
        }
        if state.has_valid_claim(&id, now) {
            debug!(record_id = %id, worker_id, "Claim refused: record already claimed");
            return Ok(false);
        }

        let lease = chrono::Duration::seconds(i64::try_from(lease_seconds).unwrap_or(i64::MAX));
        state.claims.insert(
            id,
            Claim {
                worker_id: worker_id.to_string(),
                expires_at: now + lease,
            },
        );
        Ok(true)
    }

    async fn mark_success(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.claims.remove(&id);
        if state.active.remove(&id).is_some() {
            debug!(record_id = %id, "Failed propagation resolved");
        }
        Ok(())
    }

    async fn increment_attempt(&self, id: Uuid, last_error: Option<String>) -> StoreResult<()> {
        let now = self.clock.now();
        let max_attempts = self.config.max_attempts;
        let mut state = self.state.lock().await;

        let record = state
            .active
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;
        record.attempts = record.attempts.saturating_add(1);
        if last_error.is_some() {
            record.last_error = last_error;
        }
        record.updated_at = now;
        let attempts = record.attempts;
        state.claims.remove(&id);

        if attempts >= max_attempts {
            warn!(
                record_id = %id,
                attempts,
                max_attempts,
                "Failed propagation exhausted its retries"
            );
            return state.move_to_dlq(id, &format!("max attempts ({max_attempts}) reached"), now);
        }

        debug!(
            record_id = %id,
            attempts,
            next_delay_secs = backoff_delay_secs(attempts),
            "Recorded failed retry"
        );
        Ok(())
    }

    async fn mark_permanent_failure(&self, id: Uuid, reason: &str) -> StoreResult<()> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.move_to_dlq(id, reason, now)
    }

    async fn get_stats(&self) -> StoreResult<ReconciliationStats> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        Ok(ReconciliationStats {
            active_records: state.active.len(),
            claimed_records: state
                .claims
                .iter()
                .filter(|(id, claim)| claim.is_valid_at(now) && state.active.contains_key(*id))
                .count(),
            dlq_records: state.dlq.len(),
        })
    }

    async fn get_dlq_entries(&self) -> StoreResult<Vec<FailedPropagation>> {
        let state = self.state.lock().await;
        Ok(state.dlq.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use membersync_provider::{ManualClock, MembershipAction};

    fn store_with_clock() -> (InMemoryReconciliationStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryReconciliationStore::with_clock(StoreConfig::default(), clock.clone());
        (store, clock)
    }

    fn record() -> FailedPropagation {
        FailedPropagation::new("grp", "aws", MembershipAction::AddMember, "user@example.com")
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_timestamps() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();

        clock.advance_secs(60);
        let due = store.fetch_due(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, Some(id));
        assert_eq!(due[0].created_at, due[0].updated_at);
    }

    #[tokio::test]
    async fn test_fetch_due_respects_backoff() {
        let (store, clock) = store_with_clock();
        store.save_failed_propagation(record()).await.unwrap();

        assert!(store.fetch_due(10).await.unwrap().is_empty());
        clock.advance_secs(59);
        assert!(store.fetch_due(10).await.unwrap().is_empty());
        clock.advance_secs(1);
        assert_eq!(store.fetch_due(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_due_honours_limit() {
        let (store, clock) = store_with_clock();
        for _ in 0..5 {
            store.save_failed_propagation(record()).await.unwrap();
        }
        clock.advance_secs(60);
        assert_eq!(store.fetch_due(3).await.unwrap().len(), 3);
        assert_eq!(store.fetch_due(0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_fetch_due_skips_claimed() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();
        clock.advance_secs(60);

        assert!(store.claim_record(id, "worker-a", 300).await.unwrap());
        assert!(store.fetch_due(10).await.unwrap().is_empty());
        assert_eq!(store.claim_holder(id).await.as_deref(), Some("worker-a"));
    }

    #[tokio::test]
    async fn test_second_claim_refused_until_expiry() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();
        clock.advance_secs(60);

        assert!(store.claim_record(id, "worker-a", 30).await.unwrap());
        assert!(!store.claim_record(id, "worker-b", 30).await.unwrap());

        clock.advance_secs(30);
        assert!(store.claim_record(id, "worker-b", 30).await.unwrap());
        assert_eq!(store.claim_holder(id).await.as_deref(), Some("worker-b"));
    }

    #[tokio::test]
    async fn test_claim_unknown_record() {
        let (store, _clock) = store_with_clock();
        assert!(!store.claim_record(Uuid::new_v4(), "w", 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_attempt_refreshes_backoff() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();
        clock.advance_secs(60);

        store
            .increment_attempt(id, Some("throttled".to_string()))
            .await
            .unwrap();

        // attempts == 1 → 120s since the refresh
        clock.advance_secs(119);
        assert!(store.fetch_due(10).await.unwrap().is_empty());
        clock.advance_secs(1);
        let due = store.fetch_due(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
        assert_eq!(due[0].last_error.as_deref(), Some("throttled"));
    }

    #[tokio::test]
    async fn test_increment_attempt_releases_claim() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();
        clock.advance_secs(60);
        assert!(store.claim_record(id, "worker-a", 300).await.unwrap());

        store.increment_attempt(id, None).await.unwrap();
        assert_eq!(store.get_stats().await.unwrap().claimed_records, 0);
    }

    #[tokio::test]
    async fn test_claim_refused_before_backoff_elapses() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();

        assert!(!store.claim_record(id, "worker-a", 300).await.unwrap());
        clock.advance_secs(59);
        assert!(!store.claim_record(id, "worker-a", 300).await.unwrap());
        clock.advance_secs(1);
        assert!(store.claim_record(id, "worker-a", 300).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_refused_after_failed_retry_until_next_window() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();
        clock.advance_secs(60);

        let stale = store.fetch_due(10).await.unwrap();
        assert_eq!(stale.len(), 1);

        assert!(store.claim_record(id, "worker-a", 300).await.unwrap());
        store
            .increment_attempt(id, Some("throttled".to_string()))
            .await
            .unwrap();

        // worker-b still holds the earlier fetch result.
        assert!(!store.claim_record(id, "worker-b", 300).await.unwrap());
        clock.advance_secs(119);
        assert!(!store.claim_record(id, "worker-b", 300).await.unwrap());
        clock.advance_secs(1);
        assert!(store.claim_record(id, "worker-b", 300).await.unwrap());
        assert_eq!(store.claim_holder(id).await.as_deref(), Some("worker-b"));
    }

    #[tokio::test]
    async fn test_increment_attempt_promotes_to_dlq() {
        let (store, _clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();

        for i in 0..5 {
            store
                .increment_attempt(id, Some(format!("failure {i}")))
                .await
                .unwrap();
        }

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.active_records, 0);
        assert_eq!(stats.dlq_records, 1);

        let dlq = store.get_dlq_entries().await.unwrap();
        assert_eq!(dlq[0].attempts, 5);
        assert_eq!(dlq[0].op_status, PropagationStatus::PermanentError);
        assert_eq!(
            dlq[0].last_error.as_deref(),
            Some("failure 4 | max attempts (5) reached")
        );

        let err = store.increment_attempt(id, None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_mark_permanent_failure() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();
        clock.advance_secs(60);
        assert!(store.claim_record(id, "worker-a", 300).await.unwrap());

        store
            .mark_permanent_failure(id, "group deleted")
            .await
            .unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(
            stats,
            ReconciliationStats {
                active_records: 0,
                claimed_records: 0,
                dlq_records: 1,
            }
        );
        let dlq = store.get_dlq_entries().await.unwrap();
        assert_eq!(dlq[0].last_error.as_deref(), Some("group deleted"));
        assert!(dlq[0].is_dead_lettered());
    }

    #[tokio::test]
    async fn test_dlq_keeps_insertion_order() {
        let (store, _clock) = store_with_clock();
        let first = store.save_failed_propagation(record()).await.unwrap();
        let second = store.save_failed_propagation(record()).await.unwrap();

        store.mark_permanent_failure(second, "b").await.unwrap();
        store.mark_permanent_failure(first, "a").await.unwrap();

        let ids: Vec<_> = store
            .get_dlq_entries()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![Some(second), Some(first)]);
    }

    #[tokio::test]
    async fn test_mark_success_is_idempotent() {
        let (store, clock) = store_with_clock();
        let id = store.save_failed_propagation(record()).await.unwrap();
        clock.advance_secs(60);
        assert!(store.claim_record(id, "worker-a", 300).await.unwrap());

        store.mark_success(id).await.unwrap();
        let after_first = store.get_stats().await.unwrap();
        store.mark_success(id).await.unwrap();
        let after_second = store.get_stats().await.unwrap();

        assert_eq!(after_first, ReconciliationStats::default());
        assert_eq!(after_first, after_second);
    }
}
