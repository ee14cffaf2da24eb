//! Shared building blocks for Lumen crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error vocabulary, failure classification, serde helpers
//! - `observability`: tracing instrumentation (not included by default)
//! - `runtime`: async resilience stages (circuit breaker, retrier, timeouts)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{classify, classify_message, Classify, CommonError, ContextError, ErrorKind};
#[cfg(feature = "runtime")]
pub use resilience::{
    AttemptError, BackoffConfig, CallContext, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerStats, CircuitState, Clock, Jitter, MockClock, QueryComplexity, ResilienceError,
    ResilienceResult, Retrier, SystemClock, TimeoutConfig, TimeoutManager,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
