//! Record types for the reconciliation store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use membersync_provider::MembershipAction;

/// Classification of a failed propagation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PropagationStatus {
    /// Record is active and will be retried.
    #[default]
    RetryableError,
    /// Record is dead-lettered.
    PermanentError,
}

impl PropagationStatus {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PropagationStatus::RetryableError => "retryable_error",
            PropagationStatus::PermanentError => "permanent_error",
        }
    }
}

impl std::fmt::Display for PropagationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A secondary-provider write that failed and awaits retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPropagation {
    /// Store-assigned identifier, `None` until saved.
    pub id: Option<Uuid>,
    /// Group identifier in the primary provider.
    pub group_id: String,
    /// Secondary provider this record targets.
    pub provider: String,
    /// Membership change to replay.
    pub action: MembershipAction,
    /// Arguments needed to replay the change.
    pub payload_raw: serde_json::Value,
    /// Last known classification.
    pub op_status: PropagationStatus,
    /// Failed retry count.
    pub attempts: u32,
    /// Most recent failure message.
    pub last_error: Option<String>,
    /// Correlation ID of the originating request.
    pub correlation_id: Option<String>,
    /// Justification of the originating request.
    pub justification: Option<String>,
    /// When the record was saved.
    pub created_at: DateTime<Utc>,
    /// Last mutation; drives backoff eligibility.
    pub updated_at: DateTime<Utc>,
}

impl FailedPropagation {
    /// Create an unsaved record for a failed write of `member_email`.
    ///
    /// Timestamps are placeholders until the store stamps them on save.
    pub fn new(
        group_id: impl Into<String>,
        provider: impl Into<String>,
        action: MembershipAction,
        member_email: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            group_id: group_id.into(),
            provider: provider.into(),
            action,
            payload_raw: serde_json::json!({ "member_email": member_email.into() }),
            op_status: PropagationStatus::RetryableError,
            attempts: 0,
            last_error: None,
            correlation_id: None,
            justification: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Set the justification.
    #[must_use]
    pub fn with_justification(mut self, justification: Option<String>) -> Self {
        self.justification = justification;
        self
    }

    /// Set the initial failure message.
    #[must_use]
    pub fn with_last_error(mut self, last_error: Option<String>) -> Self {
        self.last_error = last_error;
        self
    }

    /// Add a field to the replay payload.
    #[must_use]
    pub fn with_payload_field(mut self, key: &str, value: serde_json::Value) -> Self {
        if let Some(map) = self.payload_raw.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Member the change applies to.
    #[must_use]
    pub fn member_email(&self) -> Option<&str> {
        self.payload_raw.get("member_email")?.as_str()
    }

    /// Secondary group resolved when the record was created, if any.
    #[must_use]
    pub fn secondary_group_id(&self) -> Option<&str> {
        self.payload_raw.get("secondary_group_id")?.as_str()
    }

    /// Whether the record has been dead-lettered.
    #[must_use]
    pub fn is_dead_lettered(&self) -> bool {
        self.op_status == PropagationStatus::PermanentError
    }
}

/// Record counts reported by a reconciliation store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationStats {
    /// Records awaiting retry (claimed or not).
    pub active_records: usize,
    /// Active records under an unexpired claim.
    pub claimed_records: usize,
    /// Dead-lettered records.
    pub dlq_records: usize,
}
