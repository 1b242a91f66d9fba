//! Audit events emitted after membership operations.
//!
//! Delivery is best effort: a failing sink is logged and never affects the
//! outcome returned to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use membersync_provider::MembershipAction;

/// Audit delivery errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink could not deliver the event.
    #[error("Audit delivery failed: {message}")]
    Delivery { message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for audit delivery.
pub type AuditResult<T> = Result<T, AuditError>;

/// Audit event type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipEventType {
    /// A member was added to a group.
    #[serde(rename = "group.member.added")]
    MemberAdded,
    /// A member was removed from a group.
    #[serde(rename = "group.member.removed")]
    MemberRemoved,
}

impl MembershipEventType {
    /// Fully qualified event type name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipEventType::MemberAdded => "group.member.added",
            MembershipEventType::MemberRemoved => "group.member.removed",
        }
    }
}

impl From<MembershipAction> for MembershipEventType {
    fn from(action: MembershipAction) -> Self {
        match action {
            MembershipAction::AddMember => MembershipEventType::MemberAdded,
            MembershipAction::RemoveMember => MembershipEventType::MemberRemoved,
        }
    }
}

impl std::fmt::Display for MembershipEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event describing the outcome of one orchestrated membership change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipEvent {
    /// Event type.
    pub event_type: MembershipEventType,
    /// Primary group identifier.
    pub group_id: String,
    /// Primary provider name.
    pub provider: String,
    /// Member the change applies to.
    pub member_email: String,
    /// Whether the primary write succeeded.
    pub success: bool,
    /// Whether any secondary propagation failed.
    pub partial_failures: bool,
    /// Justification given by the requester.
    #[serde(default)]
    pub justification: Option<String>,
    /// Correlation ID of the request.
    pub correlation_id: String,
    /// When the event was produced.
    pub occurred_at: DateTime<Utc>,
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Deliver one event.
    async fn emit(&self, event: &MembershipEvent) -> AuditResult<()>;
}

/// Sink that writes events to the `audit` tracing target as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: &MembershipEvent) -> AuditResult<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(
            target: "audit",
            event_type = %event.event_type,
            correlation_id = %event.correlation_id,
            payload = %payload,
            "Membership audit event"
        );
        Ok(())
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn emit(&self, _event: &MembershipEvent) -> AuditResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> MembershipEvent {
        MembershipEvent {
            event_type: MembershipEventType::MemberAdded,
            group_id: "grp".to_string(),
            provider: "google".to_string(),
            member_email: "user@example.com".to_string(),
            success: true,
            partial_failures: false,
            justification: Some("on-call rotation".to_string()),
            correlation_id: "corr-1".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            MembershipEventType::from(MembershipAction::AddMember).as_str(),
            "group.member.added"
        );
        assert_eq!(
            MembershipEventType::from(MembershipAction::RemoveMember).as_str(),
            "group.member.removed"
        );
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["event_type"], "group.member.added");
        assert_eq!(json["provider"], "google");
        assert_eq!(json["success"], true);
        assert_eq!(json["correlation_id"], "corr-1");
    }

    #[tokio::test]
    async fn test_builtin_sinks_accept_events() {
        assert!(TracingAuditSink.emit(&event()).await.is_ok());
        assert!(NoopAuditSink.emit(&event()).await.is_ok());
    }
}
