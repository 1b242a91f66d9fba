//! Provider traits
//!
//! The seams through which membersync talks to directory systems. Concrete
//! adapters (Google Directory, AWS Identity Store, Slack) live outside this
//! crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::result::OperationResult;
use crate::types::ProviderKind;

/// Metadata forwarded with every membership write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMeta {
    /// Correlation ID tying the write to the originating request.
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Why the change was requested.
    #[serde(default)]
    pub justification: Option<String>,
}

impl OperationMeta {
    /// Create metadata with a correlation ID and justification.
    pub fn new(correlation_id: impl Into<String>, justification: Option<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            justification,
        }
    }
}

/// A directory system that holds groups and their members.
///
/// Adapters return `Err` for failures they could not classify into an
/// [`OperationResult`]; callers decide how such errors are treated.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    /// Registry name of this provider (e.g. `"google"`, `"aws"`).
    fn name(&self) -> &str;

    /// Kind of directory system.
    fn kind(&self) -> ProviderKind;

    /// Add `member_email` to `group_id`.
    async fn add_member(
        &self,
        group_id: &str,
        member_email: &str,
        meta: &OperationMeta,
    ) -> ProviderResult<OperationResult>;

    /// Remove `member_email` from `group_id`.
    async fn remove_member(
        &self,
        group_id: &str,
        member_email: &str,
        meta: &OperationMeta,
    ) -> ProviderResult<OperationResult>;

    /// List the groups `user_email` belongs to.
    ///
    /// Successful results carry `{"groups": [...]}` as data.
    async fn list_groups_for_user(&self, user_email: &str) -> ProviderResult<OperationResult>;

    /// List the groups `user_email` manages.
    async fn list_groups_managed_by_user(
        &self,
        user_email: &str,
    ) -> ProviderResult<OperationResult>;
}

/// Resolves a primary group to the matching group in a secondary provider.
#[async_trait]
pub trait GroupMapper: Send + Sync {
    /// Secondary group ID for `primary_group_id`, or `None` when the group is
    /// not mirrored into `secondary_provider`.
    async fn map_primary_to_secondary_group(
        &self,
        primary_group_id: &str,
        secondary_provider: &str,
    ) -> Option<String>;
}
