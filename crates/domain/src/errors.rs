//! Error types surfaced to callers of the execution layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Lumen
///
/// Messages are written for the caller: stage internals (which attempt
/// failed, which layer gave up) are folded into one of these variants before
/// leaving the client.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum LumenError {
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("service temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("circuit breaker is open: {0}")]
    CircuitOpen(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },
}

impl LumenError {
    /// Whether a later call might succeed without any change on the caller's
    /// side
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_)
                | Self::Unavailable(_)
                | Self::CircuitOpen(_)
                | Self::Timeout(_)
                | Self::Exhausted { .. }
        )
    }
}

/// Result type alias for Lumen operations
pub type Result<T> = std::result::Result<T, LumenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_caller_oriented() {
        assert_eq!(
            LumenError::RateLimited("embeddings".into()).to_string(),
            "rate limit exceeded: embeddings"
        );
        assert_eq!(
            LumenError::Exhausted { attempts: 4, message: "connection reset".into() }.to_string(),
            "operation failed after 4 attempts: connection reset"
        );
        assert!(LumenError::CircuitOpen("openai".into())
            .to_string()
            .starts_with("circuit breaker is open"));
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(LumenError::Validation("texts".into()))
            .expect("serializes");
        assert_eq!(json, serde_json::json!({ "type": "Validation", "message": "texts" }));
    }

    #[test]
    fn transient_errors() {
        assert!(LumenError::Timeout("chat".into()).is_transient());
        assert!(!LumenError::Authentication("bad key".into()).is_transient());
        assert!(!LumenError::Cancelled.is_transient());
    }
}
