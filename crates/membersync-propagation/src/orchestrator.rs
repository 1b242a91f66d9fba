//! Membership orchestrator.
//!
//! Applies a membership change to the primary provider and, once that
//! succeeds, fans it out to every secondary provider. Secondary failures are
//! queued for the reconciliation worker instead of failing the request.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use membersync_provider::{
    CircuitBreakerRegistry, DirectoryProvider, GroupMapper, MembershipAction, OperationMeta,
    OperationResult, ProviderError, ProviderRegistry, ProviderResult,
};

use crate::config::OrchestratorConfig;
use crate::events::{AuditSink, MembershipEvent, MembershipEventType, TracingAuditSink};
use crate::reconciliation::{FailedPropagation, ReconciliationStore};

/// Errors returned by the orchestrator.
///
/// Provider failures are reported inside [`MembershipOutcome`], never here.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request was rejected before any provider was contacted.
    #[error("Validation failed: {message}")]
    Validation { message: String },
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Outcome of an add or remove request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipOutcome {
    /// Which change was requested.
    pub action: MembershipAction,
    /// Primary group identifier.
    pub group_id: String,
    /// Member the change applies to.
    pub member_email: String,
    /// Correlation ID shared by the outcome, queued retries and audit event.
    pub correlation_id: String,
    /// Result of the primary write.
    pub primary: OperationResult,
    /// Results per contacted secondary provider.
    pub propagation: BTreeMap<String, OperationResult>,
    /// True when any secondary result is not a success.
    pub partial_failures: bool,
}

impl MembershipOutcome {
    /// Whether the primary write succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.primary.is_success()
    }
}

/// Coordinates primary writes, secondary propagation and retry enqueueing.
pub struct MembershipOrchestrator {
    registry: Arc<ProviderRegistry>,
    mapper: Arc<dyn GroupMapper>,
    store: Arc<dyn ReconciliationStore>,
    breakers: CircuitBreakerRegistry,
    audit: Arc<dyn AuditSink>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for MembershipOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipOrchestrator")
            .field("registry", &self.registry)
            .field("breakers", &self.breakers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MembershipOrchestrator {
    /// Create an orchestrator that audits through [`TracingAuditSink`].
    pub fn new(
        registry: Arc<ProviderRegistry>,
        mapper: Arc<dyn GroupMapper>,
        store: Arc<dyn ReconciliationStore>,
        breakers: CircuitBreakerRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            mapper,
            store,
            breakers,
            audit: Arc::new(TracingAuditSink),
            config,
        }
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Circuit breakers guarding secondary providers.
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Provider registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Add `member_email` to `primary_group_id` everywhere it is mirrored.
    pub async fn add_member_to_group(
        &self,
        primary_group_id: &str,
        member_email: &str,
        justification: Option<&str>,
        correlation_id: Option<String>,
    ) -> OrchestratorResult<MembershipOutcome> {
        self.apply(
            MembershipAction::AddMember,
            primary_group_id,
            member_email,
            justification,
            correlation_id,
        )
        .await
    }

    /// Remove `member_email` from `primary_group_id` everywhere it is mirrored.
    pub async fn remove_member_from_group(
        &self,
        primary_group_id: &str,
        member_email: &str,
        justification: Option<&str>,
        correlation_id: Option<String>,
    ) -> OrchestratorResult<MembershipOutcome> {
        self.apply(
            MembershipAction::RemoveMember,
            primary_group_id,
            member_email,
            justification,
            correlation_id,
        )
        .await
    }

    /// Groups `user_email` belongs to, according to the primary provider.
    ///
    /// Any failure degrades to an empty list.
    #[instrument(skip(self))]
    pub async fn list_groups_for_user(&self, user_email: &str) -> Vec<serde_json::Value> {
        let primary = self.registry.get_primary_provider();
        extract_groups(primary.list_groups_for_user(user_email).await)
    }

    /// Groups `user_email` manages, according to the primary provider.
    #[instrument(skip(self))]
    pub async fn list_groups_managed_by_user(&self, user_email: &str) -> Vec<serde_json::Value> {
        let primary = self.registry.get_primary_provider();
        extract_groups(primary.list_groups_managed_by_user(user_email).await)
    }

    #[instrument(skip_all, fields(action = %action, group_id = %primary_group_id))]
    async fn apply(
        &self,
        action: MembershipAction,
        primary_group_id: &str,
        member_email: &str,
        justification: Option<&str>,
        correlation_id: Option<String>,
    ) -> OrchestratorResult<MembershipOutcome> {
        self.validate_justification(justification)?;

        let correlation_id = correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let meta = OperationMeta::new(correlation_id.clone(), justification.map(str::to_string));
        let primary_name = self.registry.get_primary_provider_name().to_string();
        let primary = self.registry.get_primary_provider();

        let primary_result = to_operation_result(
            call_provider(primary.as_ref(), action, primary_group_id, member_email, &meta).await,
        );

        let mut propagation = BTreeMap::new();
        if primary_result.is_success() {
            let secondaries = self.registry.secondary_names();
            let calls = secondaries.iter().map(|name| {
                self.propagate(name, action, primary_group_id, member_email, &meta, &primary_name)
            });
            for (name, result) in secondaries.iter().zip(join_all(calls).await) {
                if let Some(result) = result {
                    propagation.insert(name.clone(), result);
                }
            }
        } else {
            warn!(
                provider = %primary_name,
                correlation_id = %correlation_id,
                error = %primary_result.describe(),
                "Primary provider rejected membership change, skipping propagation"
            );
        }

        let partial_failures = propagation.values().any(|r| !r.is_success());
        let outcome = MembershipOutcome {
            action,
            group_id: primary_group_id.to_string(),
            member_email: member_email.to_string(),
            correlation_id,
            primary: primary_result,
            propagation,
            partial_failures,
        };

        info!(
            correlation_id = %outcome.correlation_id,
            success = outcome.is_success(),
            partial_failures = outcome.partial_failures,
            secondaries = outcome.propagation.len(),
            "Membership change processed"
        );

        self.emit_audit(&outcome, &primary_name, justification).await;
        Ok(outcome)
    }

    fn validate_justification(&self, justification: Option<&str>) -> OrchestratorResult<()> {
        if !self.config.require_justification {
            return Ok(());
        }

        let length = justification.map_or(0, |j| j.trim().chars().count());
        if length < self.config.min_justification_length {
            return Err(OrchestratorError::Validation {
                message: format!(
                    "justification must be at least {} characters",
                    self.config.min_justification_length
                ),
            });
        }
        Ok(())
    }

    /// Propagate to one secondary. `None` means the group is not mirrored
    /// there and the provider was skipped.
    async fn propagate(
        &self,
        provider_name: &str,
        action: MembershipAction,
        primary_group_id: &str,
        member_email: &str,
        meta: &OperationMeta,
        primary_name: &str,
    ) -> Option<OperationResult> {
        let provider = self.registry.get_provider(provider_name)?;

        let mut secondary_group_id = None;
        let result = if self.breakers.allow_request(provider_name).await {
            match self
                .mapper
                .map_primary_to_secondary_group(primary_group_id, provider_name)
                .await
            {
                Some(group_id) => {
                    let result = to_operation_result(
                        call_provider(provider.as_ref(), action, &group_id, member_email, meta)
                            .await,
                    );
                    if result.is_success() {
                        self.breakers.record_success(provider_name).await;
                    } else {
                        self.breakers.record_failure(provider_name).await;
                    }
                    secondary_group_id = Some(group_id);
                    result
                }
                None => {
                    self.breakers.release_probe(provider_name).await;
                    debug!(
                        provider = %provider_name,
                        group_id = %primary_group_id,
                        "No secondary group mapping, skipping provider"
                    );
                    return None;
                }
            }
        } else {
            warn!(
                target: "circuit_breaker",
                provider = %provider_name,
                "Circuit open, deferring propagation to reconciliation"
            );
            OperationResult::from_error(&ProviderError::CircuitOpen {
                provider: provider_name.to_string(),
            })
        };

        if !result.is_success() {
            self.enqueue_retry(
                provider_name,
                action,
                primary_group_id,
                member_email,
                meta,
                primary_name,
                secondary_group_id,
                &result,
            )
            .await;
        }

        Some(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn enqueue_retry(
        &self,
        provider_name: &str,
        action: MembershipAction,
        primary_group_id: &str,
        member_email: &str,
        meta: &OperationMeta,
        primary_name: &str,
        secondary_group_id: Option<String>,
        result: &OperationResult,
    ) {
        let mut record = FailedPropagation::new(primary_group_id, provider_name, action, member_email)
            .with_correlation_id(meta.correlation_id.clone())
            .with_justification(meta.justification.clone())
            .with_last_error(Some(result.describe()))
            .with_payload_field("primary_provider", serde_json::json!(primary_name));
        if let Some(group_id) = secondary_group_id {
            record = record.with_payload_field("secondary_group_id", serde_json::json!(group_id));
        }
        if let Some(code) = result.error_code() {
            record = record.with_payload_field("error_code", serde_json::json!(code));
        }

        match self.store.save_failed_propagation(record).await {
            Ok(id) => info!(
                provider = %provider_name,
                record_id = %id,
                error = %result.describe(),
                "Queued failed propagation for reconciliation"
            ),
            Err(e) => warn!(
                provider = %provider_name,
                error = %e,
                "Failed to queue propagation for reconciliation"
            ),
        }
    }

    async fn emit_audit(
        &self,
        outcome: &MembershipOutcome,
        primary_name: &str,
        justification: Option<&str>,
    ) {
        let event = MembershipEvent {
            event_type: MembershipEventType::from(outcome.action),
            group_id: outcome.group_id.clone(),
            provider: primary_name.to_string(),
            member_email: outcome.member_email.clone(),
            success: outcome.is_success(),
            partial_failures: outcome.partial_failures,
            justification: justification.map(str::to_string),
            correlation_id: outcome.correlation_id.clone(),
            occurred_at: Utc::now(),
        };

        if let Err(e) = self.audit.emit(&event).await {
            warn!(
                correlation_id = %outcome.correlation_id,
                error = %e,
                "Failed to emit audit event"
            );
        }
    }
}

/// Dispatch `action` to a provider.
pub(crate) async fn call_provider(
    provider: &dyn DirectoryProvider,
    action: MembershipAction,
    group_id: &str,
    member_email: &str,
    meta: &OperationMeta,
) -> ProviderResult<OperationResult> {
    match action {
        MembershipAction::AddMember => provider.add_member(group_id, member_email, meta).await,
        MembershipAction::RemoveMember => {
            provider.remove_member(group_id, member_email, meta).await
        }
    }
}

/// Unclassified provider errors count as permanent during orchestration.
fn to_operation_result(result: ProviderResult<OperationResult>) -> OperationResult {
    match result {
        Ok(result) => result,
        Err(e) => OperationResult::permanent_error(e.to_string(), e.error_code()),
    }
}

fn extract_groups(result: ProviderResult<OperationResult>) -> Vec<serde_json::Value> {
    let result = match result {
        Ok(result) if result.is_success() => result,
        Ok(result) => {
            debug!(error = %result.describe(), "Group listing failed");
            return Vec::new();
        }
        Err(e) => {
            debug!(error = %e, "Group listing failed");
            return Vec::new();
        }
    };

    match result.data() {
        Some(serde_json::Value::Object(data)) => match data.get("groups") {
            Some(serde_json::Value::Array(groups)) => groups.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
