//! Provider error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// Error raised by a provider adapter while talking to its directory.
#[derive(Debug, Error)]
pub enum ProviderError {
    // Transient errors
    /// Failed to establish a connection to the directory API.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request timed out.
    #[error("request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Directory API rate limit hit.
    #[error("rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Directory API is temporarily unavailable.
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    /// Call rejected locally because the provider's circuit is open.
    #[error("circuit open for provider {provider}")]
    CircuitOpen { provider: String },

    // Permanent errors
    /// Group or member does not exist.
    #[error("not found: {identifier}")]
    NotFound { identifier: String },

    /// Membership change conflicts with current state.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Credentials rejected by the directory.
    #[error("authentication failed for provider {provider}")]
    AuthenticationFailed { provider: String },

    /// Credentials lack the required permission.
    #[error("permission denied: {operation}")]
    PermissionDenied { operation: String },

    /// Request rejected as malformed.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Unexpected adapter failure.
    #[error("internal provider error: {message}")]
    Internal { message: String },
}

impl ProviderError {
    /// Check whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::ConnectionFailed { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::RateLimited { .. }
                | ProviderError::Unavailable { .. }
                | ProviderError::CircuitOpen { .. }
        )
    }

    /// Stable error code recorded on operation results.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ProviderError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ProviderError::Timeout { .. } => "TIMEOUT",
            ProviderError::RateLimited { .. } => "RATE_LIMITED",
            ProviderError::Unavailable { .. } => "UNAVAILABLE",
            ProviderError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            ProviderError::NotFound { .. } => "NOT_FOUND",
            ProviderError::Conflict { .. } => "CONFLICT",
            ProviderError::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            ProviderError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ProviderError::InvalidRequest { .. } => "INVALID_REQUEST",
            ProviderError::Internal { .. } => "INTERNAL",
        }
    }

    /// Convenience constructor for an unavailable provider.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ProviderError::Unavailable {
            message: message.into(),
        }
    }

    /// Convenience constructor for an internal adapter failure.
    pub fn internal(message: impl Into<String>) -> Self {
        ProviderError::Internal {
            message: message.into(),
        }
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error raised while building a provider registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No provider was registered as primary.
    #[error("no primary provider registered")]
    NoPrimary,

    /// More than one provider was registered as primary.
    #[error("multiple primary providers registered: {first} and {second}")]
    MultiplePrimaries { first: String, second: String },

    /// Two providers share a name.
    #[error("duplicate provider name: {name}")]
    DuplicateProvider { name: String },
}
