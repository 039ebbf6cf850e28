//! Error taxonomy shared across the workspace.
//!
//! Six kinds, each mapped to one HTTP status. Validation / Authorization /
//! NotFound / Conflict are terminal and surfaced to the caller unchanged;
//! Upstream and Transient are the retryable classes the reconciliation saga
//! and HTTP transport act on.

use serde::Serialize;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Bad input. Terminal, 400.
    Validation(String),
    /// Wrong actor for the operation. Terminal, 403.
    Authorization(String),
    /// Entity does not exist. Terminal, 404.
    NotFound(String),
    /// State-machine violation or idempotency clash. Terminal, 409.
    Conflict(String),
    /// A downstream dependency failed in a non-retryable way. 502.
    Upstream(String),
    /// Timeout / retryable failure. 500; transports may redeliver.
    Transient(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        DomainError::Authorization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        DomainError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        DomainError::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        DomainError::Upstream(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        DomainError::Transient(msg.into())
    }

    /// Conflict for an illegal state transition. Always names both the
    /// current and the attempted state.
    pub fn invalid_transition(entity: &str, from: &str, to: &str) -> Self {
        DomainError::Conflict(format!(
            "illegal {entity} transition: current status {from}, attempted {to}"
        ))
    }

    /// Stable machine-readable kind, used in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "VALIDATION",
            DomainError::Authorization(_) => "AUTHORIZATION",
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::Conflict(_) => "CONFLICT",
            DomainError::Upstream(_) => "UPSTREAM",
            DomainError::Transient(_) => "TRANSIENT",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DomainError::Validation(m)
            | DomainError::Authorization(m)
            | DomainError::NotFound(m)
            | DomainError::Conflict(m)
            | DomainError::Upstream(m)
            | DomainError::Transient(m) => m,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            DomainError::Validation(_) => 400,
            DomainError::Authorization(_) => 403,
            DomainError::NotFound(_) => 404,
            DomainError::Conflict(_) => 409,
            DomainError::Upstream(_) => 502,
            DomainError::Transient(_) => 500,
        }
    }

    /// True for the classes a transport is allowed to redeliver/retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Transient(_) | DomainError::Upstream(_))
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for DomainError {}

/// Wire shape of every error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&DomainError> for ErrorBody {
    fn from(e: &DomainError) -> Self {
        ErrorBody {
            kind: e.kind().to_string(),
            message: e.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_both_states() {
        let e = DomainError::invalid_transition("transaction", "PENDING", "CLOSED");
        assert_eq!(e.kind(), "CONFLICT");
        assert!(e.message().contains("PENDING"));
        assert!(e.message().contains("CLOSED"));
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(DomainError::validation("x").http_status(), 400);
        assert_eq!(DomainError::authorization("x").http_status(), 403);
        assert_eq!(DomainError::not_found("x").http_status(), 404);
        assert_eq!(DomainError::conflict("x").http_status(), 409);
        assert_eq!(DomainError::upstream("x").http_status(), 502);
        assert_eq!(DomainError::transient("x").http_status(), 500);
    }

    #[test]
    fn only_upstream_and_transient_are_retryable() {
        assert!(DomainError::transient("t").is_retryable());
        assert!(DomainError::upstream("u").is_retryable());
        assert!(!DomainError::conflict("c").is_retryable());
        assert!(!DomainError::validation("v").is_retryable());
    }
}
