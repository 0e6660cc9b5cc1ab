//! Shared error and result types

use thiserror::Error;

/// Error reported by the backend API collaborator.
///
/// Carries the human-readable message the backend (or the transport) produced,
/// plus the HTTP status when there was one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    /// True when the backend refused the request as invalid (4xx).
    pub fn is_rejected(&self) -> bool {
        matches!(self.status, Some(s) if (400..500).contains(&s))
    }
}

/// Error types for the lead core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backend call failed (network, non-2xx, server-side validation)
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Stage key outside the fixed pipeline
    #[error("Unknown stage: {0}")]
    InvalidStage(String),

    /// Priority key outside the fixed set
    #[error("Unknown priority: {0}")]
    InvalidPriority(String),

    /// Entity payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mutation task ended without reporting an outcome
    #[error("Mutation {0} was abandoned before resolving")]
    Abandoned(uuid::Uuid),
}

impl CoreError {
    /// Message surfaced to the UI collaborator.
    ///
    /// Backend errors keep the backend's own text so the caller can show it verbatim.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Backend(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_preserved() {
        let err: CoreError = BackendError::with_status(422, "Lead is locked").into();
        assert_eq!(err.user_message(), "Lead is locked");
        assert_eq!(err.to_string(), "Backend error: Lead is locked");
    }

    #[test]
    fn test_rejected_status() {
        assert!(BackendError::with_status(409, "conflict").is_rejected());
        assert!(!BackendError::with_status(503, "down").is_rejected());
        assert!(!BackendError::new("connection reset").is_rejected());
    }
}
