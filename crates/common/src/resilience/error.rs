//! Stage error shared by the breaker, retrier and timeout manager

use std::time::Duration;

use thiserror::Error;

use crate::error::{Classify, CommonError, ContextError, ErrorKind};

/// Errors produced by resilience stages
///
/// Every stage accepts operations returning `Result<T, ResilienceError<E>>`
/// and returns the same type, so stacking stages never nests error types.
/// `E` is the raw operation error.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// A single attempt exceeded its deadline
    #[error("operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The caller cancelled the call
    #[error("context canceled")]
    Cancelled,

    /// The caller's own deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Every permitted attempt failed with a retryable error
    #[error("operation failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: AttemptError<E>,
    },

    /// The underlying operation failed
    #[error(transparent)]
    Operation(E),
}

/// How the final attempt failed before the retrier gave up
#[derive(Debug, Error)]
pub enum AttemptError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("attempt timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error(transparent)]
    Operation(E),
}

impl<E> Classify for AttemptError<E>
where
    E: std::error::Error + Classify + Send + Sync + 'static,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Operation(err) => err.kind(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Operation(err) => err.is_retryable(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { .. } => None,
            Self::Operation(err) => err.retry_after(),
        }
    }
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Configuration result type used by stage constructors
pub type ConfigResult<T> = Result<T, CommonError>;

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The raw operation error, looking through retry exhaustion
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(err)
            | Self::RetriesExhausted { last: AttemptError::Operation(err), .. } => Some(err),
            _ => None,
        }
    }

    /// Split out the errors a retrier may wrap in
    /// [`ResilienceError::RetriesExhausted`]; everything else is returned
    /// unchanged
    pub fn into_attempt_error(self) -> Result<AttemptError<E>, Self> {
        match self {
            Self::Timeout { timeout } => Ok(AttemptError::Timeout { timeout }),
            Self::Operation(err) => Ok(AttemptError::Operation(err)),
            other => Err(other),
        }
    }

    /// Number of attempts made, when the retrier gave up
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Whether the caller's context ended the call
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl<E> From<ContextError> for ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl<E> Classify for ResilienceError<E>
where
    E: std::error::Error + Classify + Send + Sync + 'static,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen { .. } => ErrorKind::CircuitBreaker,
            Self::Timeout { .. } | Self::Cancelled | Self::DeadlineExceeded => ErrorKind::Timeout,
            Self::RetriesExhausted { last, .. } => last.kind(),
            Self::Operation(err) => err.kind(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Operation(err) => err.is_retryable(),
            Self::CircuitOpen { .. }
            | Self::Cancelled
            | Self::DeadlineExceeded
            | Self::RetriesExhausted { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Operation(err) => err.retry_after(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error)]
    #[error("too many requests")]
    struct Throttled;

    impl Classify for Throttled {
        fn kind(&self) -> ErrorKind {
            ErrorKind::RateLimit
        }

        fn retry_after(&self) -> Option<Duration> {
            Some(Duration::from_secs(1))
        }
    }

    #[test]
    fn test_exhausted_keeps_last_error_kind_but_is_terminal() {
        let err: ResilienceError<Throttled> =
            ResilienceError::RetriesExhausted {
                attempts: 4,
                last: AttemptError::Operation(Throttled),
            };

        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert!(!err.is_retryable());
        assert_eq!(err.attempts(), Some(4));
        assert!(err.operation_error().is_some());
        assert_eq!(err.to_string(), "operation failed after 4 attempts");

        let source = std::error::Error::source(&err).expect("last attempt is the source");
        assert_eq!(source.to_string(), "too many requests");
    }

    #[test]
    fn test_context_errors_are_timeout_kind_and_terminal() {
        let cancelled: ResilienceError<Throttled> = ContextError::Cancelled.into();
        let expired: ResilienceError<Throttled> = ContextError::DeadlineExceeded.into();

        for err in [cancelled, expired] {
            assert_eq!(err.kind(), ErrorKind::Timeout);
            assert!(!err.is_retryable());
            assert!(err.is_context_error());
        }
    }

    #[test]
    fn test_attempt_timeout_is_retryable() {
        let err: ResilienceError<Throttled> =
            ResilienceError::Timeout { timeout: Duration::from_secs(60) };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_only_attempt_failures_can_be_wrapped() {
        let timeout: ResilienceError<Throttled> =
            ResilienceError::Timeout { timeout: Duration::from_secs(5) };
        let attempt = timeout.into_attempt_error().expect("timeouts are attempt failures");
        assert_eq!(attempt.kind(), ErrorKind::Timeout);
        assert!(attempt.is_retryable());
        assert_eq!(attempt.to_string(), "attempt timed out after 5s");

        let open: ResilienceError<Throttled> =
            ResilienceError::CircuitOpen { name: "llm".to_string() };
        let open = open.into_attempt_error().expect_err("breaker rejections are not attempts");
        assert_eq!(open.to_string(), "circuit breaker 'llm' is open");

        let cancelled: ResilienceError<Throttled> = ContextError::Cancelled.into();
        assert!(cancelled.into_attempt_error().is_err());
    }

    #[test]
    fn test_operation_error_forwards_retry_hint() {
        let err = ResilienceError::Operation(Throttled);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
        assert_eq!(err.to_string(), "too many requests");
    }
}
