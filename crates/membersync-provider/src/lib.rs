//! # Directory Provider Framework
//!
//! Core abstractions for talking to the directory systems whose group
//! memberships membersync keeps in step.
//!
//! One provider is authoritative (the *primary*); every other registered
//! provider is a *secondary* mirror that receives best-effort writes.
//!
//! ## Architecture
//!
//! - [`DirectoryProvider`] - Trait every provider adapter implements
//! - [`OperationResult`] - Uniform success/failure envelope for provider calls
//! - [`ProviderRegistry`] - Name to implementation map with exactly one primary
//! - [`GroupMapper`] - Resolves primary group ids to secondary group ids
//! - [`CircuitBreakerRegistry`] - Per-provider failure gating
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use membersync_provider::prelude::*;
//!
//! let registry = ProviderRegistry::builder()
//!     .primary(Arc::new(google))
//!     .secondary(Arc::new(aws))
//!     .build()?;
//!
//! let primary = registry.get_primary_provider();
//! let result = primary
//!     .add_member("eng@example.com", "user@example.com", &OperationMeta::default())
//!     .await;
//! ```
//!
//! ## Crate Organization
//!
//! - [`types`] - Provider kinds, actions and circuit states
//! - [`error`] - Error types with transient/permanent classification
//! - [`result`] - `OperationResult` envelope
//! - [`traits`] - Provider and group-mapper traits
//! - [`registry`] - Provider registry and static group mapper
//! - [`resilience`] - Circuit breaker
//! - [`clock`] - Injectable time source

pub mod clock;
pub mod error;
pub mod registry;
pub mod resilience;
pub mod result;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ProviderError, ProviderResult, RegistryError};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder, StaticGroupMapper};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStatus,
};
pub use result::{OperationResult, OperationStatus};
pub use traits::{DirectoryProvider, GroupMapper, OperationMeta};
pub use types::{CircuitState, MembershipAction, ProviderKind};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::error::{ProviderError, ProviderResult};
    pub use crate::registry::{ProviderRegistry, StaticGroupMapper};
    pub use crate::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
    pub use crate::result::{OperationResult, OperationStatus};
    pub use crate::traits::{DirectoryProvider, GroupMapper, OperationMeta};
    pub use crate::types::{CircuitState, MembershipAction, ProviderKind};
}
