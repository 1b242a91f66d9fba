//! # Membership Propagation
//!
//! Keeps group memberships in step across one primary directory and any
//! number of secondary directories.
//!
//! ## Architecture
//!
//! - [`MembershipOrchestrator`] - Writes to the primary, then fans out to secondaries
//! - [`ReconciliationStore`] - Queue of failed secondary writes with claims and a DLQ
//! - [`ReconciliationWorker`] - Periodic retry loop over the store
//! - [`AuditSink`] - Destination for membership audit events
//! - [`PropagationConfig`] - Environment-driven settings
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use membersync_propagation::prelude::*;
//!
//! let config = PropagationConfig::from_env()?;
//! let store = Arc::new(InMemoryReconciliationStore::new(config.store.clone()));
//! let breakers = CircuitBreakerRegistry::new(config.circuit_breaker.clone());
//!
//! let orchestrator = MembershipOrchestrator::new(
//!     registry.clone(),
//!     mapper.clone(),
//!     store.clone(),
//!     breakers.clone(),
//!     config.orchestrator.clone(),
//! );
//! let outcome = orchestrator
//!     .add_member_to_group("eng@example.com", "user@example.com", Some("joining platform team"), None)
//!     .await?;
//!
//! let worker = ReconciliationWorker::new(registry, mapper, store, breakers, config.worker);
//! tokio::spawn(async move { worker.run().await });
//! ```

pub mod config;
pub mod events;
pub mod orchestrator;
pub mod reconciliation;
pub mod worker;

pub use config::{ConfigError, OrchestratorConfig, PropagationConfig, WorkerConfig};
pub use events::{
    AuditError, AuditResult, AuditSink, MembershipEvent, MembershipEventType, NoopAuditSink,
    TracingAuditSink,
};
pub use orchestrator::{
    MembershipOrchestrator, MembershipOutcome, OrchestratorError, OrchestratorResult,
};
pub use reconciliation::{
    backoff_delay, backoff_delay_secs, FailedPropagation, InMemoryReconciliationStore,
    PropagationStatus, ReconciliationStats, ReconciliationStore, StoreConfig, StoreError,
    StoreResult,
};
pub use worker::{ReconciliationWorker, WorkerRunSummary};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::PropagationConfig;
    pub use crate::events::{AuditSink, TracingAuditSink};
    pub use crate::orchestrator::{MembershipOrchestrator, MembershipOutcome};
    pub use crate::reconciliation::{InMemoryReconciliationStore, ReconciliationStore};
    pub use crate::worker::ReconciliationWorker;
    pub use membersync_provider::prelude::*;
}
