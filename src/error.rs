//! Error types for the translation memory pipeline
//!
//! Every failure is classified by kind so that retry policy can dispatch
//! on it: configuration and authentication errors abort a run before any
//! batch executes, transport and rate-limit errors are retried by the
//! provider up to a fixed ceiling, malformed output triggers the repair
//! sub-protocol, and validation errors reject single keys.

use thiserror::Error;

/// Errors produced by the translation memory pipeline
#[derive(Debug, Error)]
pub enum TransmemError {
    /// Missing credentials, unknown source language, zero batch size.
    /// Fatal immediately, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication or permission failure (401/403).
    /// Fatal immediately, never retried.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Network failure, timeout or server error after the retry ceiling.
    #[error("transport error: {0}")]
    Transport(String),

    /// Rate limit (429) still in effect after the retry ceiling.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider output that failed schema validation after all repair
    /// attempts were exhausted.
    #[error("malformed provider output: {0}")]
    MalformedOutput(String),

    /// Token-preservation or signature mismatch for a single key.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransmemError {
    /// Whether this error must abort the whole run before any further
    /// batch executes (configuration and auth errors do; everything else
    /// accumulates into run statistics).
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransmemError::Config(_) | TransmemError::Auth(_))
    }
}

impl From<reqwest::Error> for TransmemError {
    fn from(err: reqwest::Error) -> Self {
        TransmemError::Transport(err.to_string())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, TransmemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_and_auth_are_fatal() {
        assert!(TransmemError::Config("no key".to_string()).is_fatal());
        assert!(TransmemError::Auth("401".to_string()).is_fatal());
    }

    #[test]
    fn test_batch_level_errors_are_not_fatal() {
        assert!(!TransmemError::Transport("timeout".to_string()).is_fatal());
        assert!(!TransmemError::RateLimited("429".to_string()).is_fatal());
        assert!(!TransmemError::MalformedOutput("bad json".to_string()).is_fatal());
        assert!(!TransmemError::Validation("token mismatch".to_string()).is_fatal());
    }

    #[test]
    fn test_display_includes_kind() {
        let err = TransmemError::RateLimited("slow down".to_string());
        assert!(err.to_string().contains("rate limited"));
    }
}
