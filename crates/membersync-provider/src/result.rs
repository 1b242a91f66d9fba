//! Operation result envelope.
//!
//! Every provider call produces an [`OperationResult`]. Failures are data:
//! callers inspect the status instead of matching on errors.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Outcome classification of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Call applied.
    Success,
    /// Call failed, retrying may succeed.
    TransientError,
    /// Call failed, retrying will not help.
    PermanentError,
}

impl OperationStatus {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::TransientError => "transient_error",
            OperationStatus::PermanentError => "permanent_error",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable outcome of a provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

impl OperationResult {
    /// Create a successful result.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: OperationStatus::Success,
            data: None,
            message: None,
            error_code: None,
        }
    }

    /// Create a successful result carrying a payload.
    #[must_use]
    pub fn success_with_data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success()
        }
    }

    /// Create a retryable failure.
    pub fn transient_error(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::TransientError,
            data: None,
            message: Some(message.into()),
            error_code: Some(error_code.into()),
        }
    }

    /// Create a non-retryable failure.
    pub fn permanent_error(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::PermanentError,
            data: None,
            message: Some(message.into()),
            error_code: Some(error_code.into()),
        }
    }

    /// Build a failure from a provider error, keeping its classification.
    #[must_use]
    pub fn from_error(error: &ProviderError) -> Self {
        if error.is_transient() {
            Self::transient_error(error.to_string(), error.error_code())
        } else {
            Self::permanent_error(error.to_string(), error.error_code())
        }
    }

    /// Attach a message to the result.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Outcome classification.
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// Result payload, if any.
    #[must_use]
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    /// Diagnostic message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Error code, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    /// Whether the call applied.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// Whether the failure may succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status == OperationStatus::TransientError
    }

    /// Human-readable failure description, falling back to the status name.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.error_code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => self.status.to_string(),
        }
    }
}
