//! # Reconciliation Store
//!
//! Durable-ish queue of secondary-provider writes that failed during
//! orchestration.
//!
//! ## Overview
//!
//! - Records are saved when a secondary propagation fails
//! - Workers fetch due records, claim them with a time-bounded lease and retry
//! - Retry eligibility follows exponential backoff on `updated_at`
//! - Records that exhaust their retries, or fail permanently, move to the DLQ
//!
//! ## Record lifecycle
//!
//! ```text
//!   save_failed_propagation
//!            │
//!            ▼
//!   ┌────────────────┐  claim_record   ┌───────────┐
//!   │     Active     │────────────────►│  Claimed  │
//!   │ (backoff wait) │◄────────────────│  (lease)  │
//!   └────────────────┘ increment /     └─────┬─────┘
//!            │         lease expiry          │
//!            │                               │ mark_success
//!            │ attempts ≥ max /              ▼
//!            │ mark_permanent_failure     (removed)
//!            ▼
//!   ┌────────────────┐
//!   │      DLQ       │
//!   └────────────────┘
//! ```

pub mod backoff;
pub mod memory;
pub mod store;
pub mod types;

pub use backoff::{backoff_delay, backoff_delay_secs};
pub use memory::{InMemoryReconciliationStore, StoreConfig};
pub use store::{ReconciliationStore, StoreError, StoreResult};
pub use types::{FailedPropagation, PropagationStatus, ReconciliationStats};
