//! Provider-boundary errors
//!
//! [`ProviderError`] is what the transport returns for a single provider
//! request. It keeps the structured facts (HTTP status, `Retry-After`) the
//! classifier needs, so the substring fallback only runs for transport errors
//! that carry no status.

pub mod conversions;

use std::time::Duration;

use lumen_common::error::{classify, Classify, ContextError, ErrorKind};
use thiserror::Error;

pub use conversions::IntoLumenError;

/// Failure of one provider request
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected credentials ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("rate limit exceeded (429): {message}")]
    RateLimited { message: String, retry_after: Option<Duration> },

    #[error("provider timed out ({status}): {message}")]
    Timeout { status: u16, message: String },

    #[error("provider server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("malformed request ({status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("embedding {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch { index: usize, expected: usize, actual: usize },

    #[error("expected {expected} embeddings, provider returned {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("chat completion contained no choices")]
    EmptyChoices,
}

/// Result type for provider requests
pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    /// Map a non-success HTTP status to an error
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authentication { status, message },
            429 => Self::RateLimited { message, retry_after },
            408 | 504 => Self::Timeout { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::BadRequest { status, message },
        }
    }

    /// HTTP status behind this error, if the provider answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Timeout { status, .. }
            | Self::Server { status, .. }
            | Self::BadRequest { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl Classify for ProviderError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Timeout { .. } | Self::Context(_) => ErrorKind::Timeout,
            Self::Http(err) => classify_transport(err),
            Self::Server { .. }
            | Self::BadRequest { .. }
            | Self::InvalidResponse(_)
            | Self::DimensionMismatch { .. }
            | Self::CountMismatch { .. }
            | Self::EmptyChoices => ErrorKind::Unknown,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            // Unclassified 5xx is worth another attempt.
            Self::Server { .. } => true,
            Self::Context(_) => false,
            other => other.kind().is_retryable(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn classify_transport(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        return ErrorKind::Timeout;
    }
    if err.is_connect() {
        return ErrorKind::Connection;
    }
    classify(Some(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (401, ErrorKind::Authentication, false),
            (403, ErrorKind::Authentication, false),
            (429, ErrorKind::RateLimit, true),
            (408, ErrorKind::Timeout, true),
            (504, ErrorKind::Timeout, true),
            (500, ErrorKind::Unknown, true),
            (503, ErrorKind::Unknown, true),
            (400, ErrorKind::Unknown, false),
            (404, ErrorKind::Unknown, false),
        ];

        for (status, kind, retryable) in cases {
            let err = ProviderError::from_status(status, "body", None);
            assert_eq!(err.kind(), kind, "status {status}");
            assert_eq!(err.is_retryable(), retryable, "status {status}");
            assert_eq!(err.status(), Some(status));
        }
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = ProviderError::from_status(429, "slow down", Some(Duration::from_secs(2)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert!(err.to_string().contains("rate limit exceeded"));
    }

    #[test]
    fn validation_failures_are_terminal() {
        let errors = [
            ProviderError::DimensionMismatch { index: 0, expected: 1536, actual: 3 },
            ProviderError::CountMismatch { expected: 2, actual: 1 },
            ProviderError::EmptyChoices,
            ProviderError::InvalidResponse("not json".into()),
        ];

        for err in errors {
            assert!(!err.is_retryable(), "{err}");
        }
    }

    #[test]
    fn context_errors_classify_as_timeout_and_stop() {
        let err = ProviderError::from(ContextError::Cancelled);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!err.is_retryable());
    }
}
