//! Error types for Synapse

use thiserror::Error;

/// Result type alias for Synapse operations
pub type Result<T> = std::result::Result<T, SynapseError>;

/// Main error type for Synapse
#[derive(Error, Debug)]
pub enum SynapseError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Memory not found: {0}")]
    NotFound(i64),

    #[error("Service unavailable ({service}): {message}")]
    ServiceUnavailable { service: &'static str, message: String },

    #[error("Malformed response from {service}: {message}")]
    MalformedResponse { service: &'static str, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SynapseError {
    /// Embedding/classifier/store endpoint unreachable or answered non-success
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        SynapseError::ServiceUnavailable {
            service,
            message: message.into(),
        }
    }

    /// Non-JSON or schema-violating payload from an external service
    pub fn malformed(service: &'static str, message: impl Into<String>) -> Self {
        SynapseError::MalformedResponse {
            service,
            message: message.into(),
        }
    }

    /// Check whether the error came from an unreachable external service
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SynapseError::ServiceUnavailable { .. } | SynapseError::Http(_)
        )
    }

    /// Wrap with operation context (which memory, which stage)
    pub fn with_context(self, context: impl std::fmt::Display) -> Self {
        match self {
            SynapseError::ServiceUnavailable { service, message } => {
                SynapseError::ServiceUnavailable {
                    service,
                    message: format!("{}: {}", context, message),
                }
            }
            SynapseError::MalformedResponse { service, message } => {
                SynapseError::MalformedResponse {
                    service,
                    message: format!("{}: {}", context, message),
                }
            }
            SynapseError::Storage(message) => {
                SynapseError::Storage(format!("{}: {}", context, message))
            }
            SynapseError::Graph(message) => SynapseError::Graph(format!("{}: {}", context, message)),
            other => SynapseError::Internal(format!("{}: {}", context, other)),
        }
    }
}
