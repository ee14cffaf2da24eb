//! Semantic failure taxonomy for outbound calls
//!
//! Every failure that crosses the resilience layer is reduced to an
//! [`ErrorKind`]. Typed errors report their kind through [`Classify`];
//! untyped errors go through [`classify`], which checks well-known sentinel
//! types along the source chain and then falls back to message markers.
//!
//! Marker priority is fixed: deadline and cancellation first, then rate
//! limiting, circuit breaker, generic timeouts, connection, authentication.
//! The first match wins, so a rate-limit error wrapped in a generic
//! "connection" or "timed out" message still classifies as
//! [`ErrorKind::RateLimit`]. Status codes only match as whole words.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Semantic category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No failure
    None,
    /// Deadline expired or caller cancelled
    Timeout,
    /// Provider throttled the request
    RateLimit,
    /// Rejected by an open circuit breaker
    CircuitBreaker,
    /// Network-level failure reaching the provider
    Connection,
    /// Credentials rejected
    Authentication,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Default retry decision for this kind
    ///
    /// Individual errors may override this through [`Classify::is_retryable`]
    /// (server errors are `Unknown` but retryable; caller cancellation is
    /// `Timeout` but terminal).
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimit | Self::Connection)
    }

    /// Stable snake_case label used in logs and reports
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::CircuitBreaker => "circuit_breaker",
            Self::Connection => "connection",
            Self::Authentication => "authentication",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that know their own [`ErrorKind`]
///
/// Object safe so retry predicates can take `&dyn Classify`.
pub trait Classify {
    /// Semantic category of this failure
    fn kind(&self) -> ErrorKind;

    /// Whether a retrier may attempt the operation again
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Minimum delay requested by the dependency, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Caller context termination reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The caller cancelled the call
    #[error("context canceled")]
    Cancelled,

    /// The caller's deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl Classify for ContextError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Timeout
    }

    fn is_retryable(&self) -> bool {
        false
    }
}

const DEADLINE_MARKERS: &[&str] = &["deadline exceeded", "context canceled", "cancelled"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "too many requests"];
const RATE_LIMIT_CODES: &[&str] = &["429"];
const CIRCUIT_BREAKER_MARKERS: &[&str] = &["circuit breaker"];
const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout"];
const CONNECTION_MARKERS: &[&str] = &[
    "connection",
    "connect error",
    "network",
    "dns",
    "broken pipe",
    "unexpected eof",
    "unreachable",
];
const AUTHENTICATION_MARKERS: &[&str] =
    &["unauthorized", "authentication", "invalid api key", "forbidden"];
const AUTHENTICATION_CODES: &[&str] = &["401"];

/// Classify an arbitrary error
///
/// Total: `None` input yields [`ErrorKind::None`] and anything unrecognised
/// yields [`ErrorKind::Unknown`].
pub fn classify(error: Option<&(dyn Error + 'static)>) -> ErrorKind {
    let Some(error) = error else {
        return ErrorKind::None;
    };

    let mut messages = Vec::new();
    let mut current = Some(error);
    while let Some(err) = current {
        if is_deadline_sentinel(err) {
            return ErrorKind::Timeout;
        }
        messages.push(err.to_string());
        current = err.source();
    }

    classify_message(&messages.join(": "))
}

/// Classify a bare error message by its markers
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_ascii_lowercase();
    let matches = |markers: &[&str]| markers.iter().any(|marker| message.contains(marker));
    let has_code = |codes: &[&str]| codes.iter().any(|code| contains_word(&message, code));

    if message.is_empty() {
        ErrorKind::Unknown
    } else if matches(DEADLINE_MARKERS) {
        ErrorKind::Timeout
    } else if matches(RATE_LIMIT_MARKERS) || has_code(RATE_LIMIT_CODES) {
        ErrorKind::RateLimit
    } else if matches(CIRCUIT_BREAKER_MARKERS) {
        ErrorKind::CircuitBreaker
    } else if matches(TIMEOUT_MARKERS) {
        ErrorKind::Timeout
    } else if matches(CONNECTION_MARKERS) {
        ErrorKind::Connection
    } else if matches(AUTHENTICATION_MARKERS) || has_code(AUTHENTICATION_CODES) {
        ErrorKind::Authentication
    } else {
        ErrorKind::Unknown
    }
}

/// `needle` occurs in `haystack` with no alphanumeric neighbour on either side
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

fn is_deadline_sentinel(err: &(dyn Error + 'static)) -> bool {
    if err.is::<ContextError>() {
        return true;
    }

    #[cfg(feature = "runtime")]
    if err.is::<tokio::time::error::Elapsed>() {
        return true;
    }

    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
}
