//! Error types for session recovery
//!
//! Recovery errors fall into three groups that drive the orchestrator's
//! reaction to a failed attempt:
//!
//! - **Fatal** - authentication is missing or the stored call-control
//!   configuration is incomplete. The session is cleared and the host is
//!   asked to log in again. Never retried.
//! - **Retriable** - restoration timeouts, unreachable services, residual
//!   unhealthiness after restoration. Retried with exponential backoff.
//! - **Lifecycle** - cancellation and misuse of the orchestrator API.

use thiserror::Error;

use crate::services::ServiceId;

/// Result type for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Errors raised while validating, restoring or verifying services
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecoveryError {
    /// Stored credentials or profile are missing; the login flow must take over
    #[error("Authentication required: {reason}")]
    AuthenticationRequired { reason: String },

    /// A required call-control field could not be derived from the session
    #[error("Missing SIP configuration: {field}")]
    MissingSipConfiguration { field: String },

    /// A polled condition did not become true in time
    #[error("Timed out after {timeout_ms}ms waiting for {condition}")]
    ConditionTimeout { condition: String, timeout_ms: u64 },

    /// An async operation exceeded its budget
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    OperationTimeout { operation: String, timeout_ms: u64 },

    /// A service rejected or failed a restoration step
    #[error("Service {service} unavailable: {reason}")]
    ServiceUnavailable { service: ServiceId, reason: String },

    /// Services were still unhealthy after the restore phase
    #[error("Verification failed: {}", issues.join(", "))]
    VerificationFailed { issues: Vec<String> },

    /// The operation was cancelled by reset, shutdown or a superseding outcome
    #[error("Operation '{operation}' cancelled")]
    Cancelled { operation: String },

    /// The orchestrator has not been given its service handles yet
    #[error("Recovery orchestrator not initialized")]
    NotInitialized,

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RecoveryError {
    /// Create a service unavailable error
    pub fn service(service: ServiceId, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service,
            reason: reason.into(),
        }
    }

    /// Create an authentication required error
    pub fn auth_required(reason: impl Into<String>) -> Self {
        Self::AuthenticationRequired {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a failed attempt with this error should be retried with backoff
    pub fn is_recoverable(&self) -> bool {
        match self {
            RecoveryError::MissingSipConfiguration { .. }
            | RecoveryError::ConditionTimeout { .. }
            | RecoveryError::OperationTimeout { .. }
            | RecoveryError::ServiceUnavailable { .. }
            | RecoveryError::VerificationFailed { .. }
            | RecoveryError::Internal { .. } => true,

            RecoveryError::AuthenticationRequired { .. }
            | RecoveryError::Cancelled { .. }
            | RecoveryError::NotInitialized
            | RecoveryError::InvalidConfiguration { .. } => false,
        }
    }

    /// Whether this error must hand control back to the login flow
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, RecoveryError::AuthenticationRequired { .. })
    }

    /// Short label used as a structured log field
    pub fn category(&self) -> &'static str {
        match self {
            RecoveryError::AuthenticationRequired { .. } => "auth",
            RecoveryError::MissingSipConfiguration { .. } => "configuration",
            RecoveryError::ConditionTimeout { .. } | RecoveryError::OperationTimeout { .. } => "timeout",
            RecoveryError::ServiceUnavailable { .. } => "service",
            RecoveryError::VerificationFailed { .. } => "verification",
            RecoveryError::Cancelled { .. } => "cancelled",
            RecoveryError::NotInitialized => "lifecycle",
            RecoveryError::InvalidConfiguration { .. } => "configuration",
            RecoveryError::Internal { .. } => "internal",
        }
    }
}
