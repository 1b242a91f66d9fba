//! Provider type definitions
//!
//! Enums shared by providers, the circuit breaker and the propagation engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of directory system behind a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Workspace directory groups
    GoogleWorkspace,
    /// AWS IAM Identity Center (Identity Store) groups
    AwsIdentityCenter,
    /// Slack user groups
    Slack,
}

impl ProviderKind {
    /// Get all supported provider kinds.
    #[must_use]
    pub fn all() -> &'static [ProviderKind] {
        &[
            ProviderKind::GoogleWorkspace,
            ProviderKind::AwsIdentityCenter,
            ProviderKind::Slack,
        ]
    }

    /// Get the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GoogleWorkspace => "google_workspace",
            ProviderKind::AwsIdentityCenter => "aws_identity_center",
            ProviderKind::Slack => "slack",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ParseProviderKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google_workspace" | "google" => Ok(ProviderKind::GoogleWorkspace),
            "aws_identity_center" | "aws" => Ok(ProviderKind::AwsIdentityCenter),
            "slack" => Ok(ProviderKind::Slack),
            _ => Err(ParseProviderKindError(s.to_string())),
        }
    }
}

/// Error parsing provider kind from string.
#[derive(Debug, Clone)]
pub struct ParseProviderKindError(String);

impl fmt::Display for ParseProviderKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid provider kind '{}', expected one of: google_workspace, aws_identity_center, slack",
            self.0
        )
    }
}

impl std::error::Error for ParseProviderKindError {}

/// Membership change applied to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipAction {
    /// Add a member to a group
    AddMember,
    /// Remove a member from a group
    RemoveMember,
}

impl MembershipAction {
    /// Get the string representation stored on propagation records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipAction::AddMember => "add_member",
            MembershipAction::RemoveMember => "remove_member",
        }
    }
}

impl fmt::Display for MembershipAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MembershipAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add_member" => Ok(MembershipAction::AddMember),
            "remove_member" => Ok(MembershipAction::RemoveMember),
            _ => Err(format!("Unknown membership action: {s}")),
        }
    }
}

/// Circuit breaker state for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, calls pass through
    #[default]
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, a limited number of probe calls are allowed
    HalfOpen,
}

impl CircuitState {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
