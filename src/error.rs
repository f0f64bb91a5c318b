//! Error types for the Convexa agent.

use std::time::Duration;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Provider errors.
///
/// `Unavailable`, `RateLimited` and `Timeout` are transient and retried;
/// everything else fails the attempt outright.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    Protocol { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }
}

/// Tool registration and execution errors (registry level).
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Tool {name} is already registered")]
    Duplicate { name: String },

    #[error("Invalid schema for tool {name}: {reason}")]
    InvalidSchema { name: String, reason: String },
}

/// Session-related errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {id} was closed")]
    Closed { id: String },

    #[error("Stored history for session {id} is unreadable: {reason}")]
    Corrupted { id: String, reason: String },

    #[error("Message text must not be empty")]
    EmptyMessage,
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_provider_errors_are_retryable() {
        let unavailable = LlmError::Unavailable {
            provider: "gemini".into(),
            reason: "503".into(),
        };
        let rate_limited = LlmError::RateLimited {
            provider: "gemini".into(),
            retry_after: None,
        };
        let timeout = LlmError::Timeout {
            provider: "gemini".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(unavailable.is_retryable());
        assert!(rate_limited.is_retryable());
        assert!(timeout.is_retryable());
    }

    #[test]
    fn protocol_and_auth_errors_are_not_retryable() {
        let protocol = LlmError::Protocol {
            provider: "gemini".into(),
            reason: "no candidates".into(),
        };
        let auth = LlmError::AuthFailed {
            provider: "gemini".into(),
        };
        assert!(!protocol.is_retryable());
        assert!(!auth.is_retryable());
    }

    #[test]
    fn session_error_converts_into_top_level() {
        let err: Error = SessionError::EmptyMessage.into();
        assert!(err.to_string().contains("empty"));
    }
}
