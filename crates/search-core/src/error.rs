//! Error types for the catalog search node.
//!
//! The variants follow the node's failure taxonomy: startup failures abort
//! node startup, channel-unavailable errors become structured "unavailable"
//! results at the service boundary, transient operation errors are counted
//! and recorded, and consumer-side connectivity failures surface as
//! persistent unavailability.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the search node.
#[derive(Debug, Error)]
pub enum SearchError {
    // Startup errors
    #[error("Startup failed: {message}")]
    StartupFailure { message: String },

    // Channel availability
    #[error("Ingest channel is not connected")]
    IngestUnavailable,

    #[error("Search channel is not connected")]
    SearchUnavailable,

    // Transient operation errors
    #[error("Index engine rejected {command}: {reason}")]
    Protocol { command: String, reason: String },

    #[error("Index engine transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // Consumer-side connectivity
    #[error("Node service unavailable at {endpoint}")]
    ServiceUnavailable { endpoint: String },

    #[error("Node service not ready after {0:?}")]
    NotReady(Duration),

    #[error("Remote call failed ({code}): {message}")]
    Remote { code: i32, message: String },

    #[error("HTTP error: {message}")]
    Http { message: String },

    // Document store errors
    #[error("Document store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Validation errors
    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for search node operations.
pub type Result<T> = std::result::Result<T, SearchError>;

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(err: rusqlite::Error) -> Self {
        SearchError::Store {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Timeout(Duration::from_secs(0))
        } else {
            SearchError::Http {
                message: err.to_string(),
            }
        }
    }
}

impl SearchError {
    /// Create a startup failure with the given message.
    pub fn startup(message: impl Into<String>) -> Self {
        SearchError::StartupFailure {
            message: message.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Connectivity error (transport, timeout, service unavailable)
    /// - -32001: Index channel unavailable
    /// - -32002: Startup failure
    /// - -32003: Index engine rejected a command
    /// - -32602: Invalid params or configuration
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            SearchError::Transport { .. }
            | SearchError::Timeout(_)
            | SearchError::ServiceUnavailable { .. }
            | SearchError::NotReady(_)
            | SearchError::Http { .. } => -32000,

            SearchError::IngestUnavailable | SearchError::SearchUnavailable => -32001,

            SearchError::StartupFailure { .. } => -32002,

            SearchError::Protocol { .. } => -32003,

            SearchError::InvalidParams { .. } | SearchError::Config { .. } => -32602,

            SearchError::Remote { code, .. } => *code,

            _ => -32603,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::Transport { .. }
                | SearchError::Timeout(_)
                | SearchError::NotReady(_)
                | SearchError::Http { .. }
        )
    }

    /// Whether the error means a required index channel is down.
    pub fn is_channel_unavailable(&self) -> bool {
        matches!(
            self,
            SearchError::IngestUnavailable | SearchError::SearchUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SearchError::Protocol {
            command: "PUSH".into(),
            reason: "invalid_format".into(),
        };
        assert_eq!(
            err.to_string(),
            "Index engine rejected PUSH: invalid_format"
        );
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(SearchError::SearchUnavailable.to_rpc_error_code(), -32001);
        assert_eq!(SearchError::startup("boom").to_rpc_error_code(), -32002);
        assert_eq!(
            SearchError::Remote {
                code: -32005,
                message: "bad".into()
            }
            .to_rpc_error_code(),
            -32005
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SearchError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!SearchError::IngestUnavailable.is_retryable());
        assert!(SearchError::IngestUnavailable.is_channel_unavailable());
    }
}
