//! Conversions from infrastructure errors into the caller-facing
//! [`LumenError`].

use lumen_common::error::{Classify, CommonError, ContextError, ErrorKind};
use lumen_common::resilience::ResilienceError;
use lumen_domain::LumenError;

use super::ProviderError;

/// Fold an infrastructure error into a [`LumenError`]
pub trait IntoLumenError {
    fn into_lumen(self) -> LumenError;
}

/* -------------------------------------------------------------------------- */
/* ProviderError → LumenError */
/* -------------------------------------------------------------------------- */

impl IntoLumenError for ProviderError {
    fn into_lumen(self) -> LumenError {
        let message = self.to_string();
        match self {
            ProviderError::Authentication { .. } => LumenError::Authentication(message),
            ProviderError::RateLimited { .. } => LumenError::RateLimited(message),
            ProviderError::Timeout { .. } => LumenError::Timeout(message),
            ProviderError::Server { .. } => LumenError::Unavailable(message),
            ProviderError::BadRequest { .. } => LumenError::Validation(message),
            ProviderError::Context(reason) => reason.into_lumen(),
            ProviderError::Http(ref err) => match self.kind() {
                ErrorKind::Timeout => LumenError::Timeout(message),
                ErrorKind::Connection => LumenError::Unavailable(message),
                _ if err.is_decode() || err.is_body() => LumenError::Internal(message),
                _ => LumenError::Unavailable(message),
            },
            ProviderError::InvalidResponse(_)
            | ProviderError::DimensionMismatch { .. }
            | ProviderError::CountMismatch { .. }
            | ProviderError::EmptyChoices => LumenError::Internal(message),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* ResilienceError<ProviderError> → LumenError */
/* -------------------------------------------------------------------------- */

impl IntoLumenError for ResilienceError<ProviderError> {
    fn into_lumen(self) -> LumenError {
        match self {
            ResilienceError::CircuitOpen { name } => LumenError::CircuitOpen(name),
            ResilienceError::Timeout { timeout } => {
                LumenError::Timeout(format!("no response within {timeout:?}"))
            }
            ResilienceError::Cancelled => LumenError::Cancelled,
            ResilienceError::DeadlineExceeded => {
                LumenError::Timeout("caller deadline exceeded".to_string())
            }
            ResilienceError::RetriesExhausted { attempts, last } => {
                let message = last.to_string();
                match last.kind() {
                    ErrorKind::RateLimit => LumenError::RateLimited(format!(
                        "gave up after {attempts} attempts: {message}"
                    )),
                    ErrorKind::Timeout | ErrorKind::Connection => LumenError::Unavailable(format!(
                        "gave up after {attempts} attempts: {message}"
                    )),
                    _ => LumenError::Exhausted { attempts, message },
                }
            }
            ResilienceError::Operation(err) => err.into_lumen(),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Context and configuration errors */
/* -------------------------------------------------------------------------- */

impl IntoLumenError for ContextError {
    fn into_lumen(self) -> LumenError {
        match self {
            ContextError::Cancelled => LumenError::Cancelled,
            ContextError::DeadlineExceeded => {
                LumenError::Timeout("caller deadline exceeded".to_string())
            }
        }
    }
}

impl IntoLumenError for CommonError {
    fn into_lumen(self) -> LumenError {
        match self {
            CommonError::Config { .. } => LumenError::Config(self.to_string()),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
