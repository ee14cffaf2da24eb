//! Resilience stages for outbound dependency calls
//!
//! Three independently usable stages plus the context they share:
//! - **[`CircuitBreaker`]**: fails fast while a dependency is unhealthy
//! - **[`Retrier`]**: exponential backoff with jitter over retryable failures
//! - **[`TimeoutManager`]**: static or complexity-adaptive per-attempt
//!   deadlines
//! - **[`CallContext`]**: caller cancellation and deadline, the single source
//!   of truth for whether a call may continue
//!
//! Every stage takes and returns [`ResilienceResult`], so they nest without
//! wrapping each other's errors. The intended composition is
//! breaker → retrier → timeout → raw call:
//!
//! ```rust,ignore
//! breaker
//!     .execute(&ctx, || {
//!         retrier.execute(&ctx, |_attempt| {
//!             timeouts.execute(&ctx, complexity, |attempt_ctx| raw_call(attempt_ctx))
//!         })
//!     })
//!     .await
//! ```
//!
//! The breaker sees one outcome per logical call, the retrier is the only
//! stage that loops, and each attempt gets a fresh deadline.

pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerStats,
    CircuitState, Clock, MockClock, SystemClock,
};
pub use context::CallContext;
pub use error::{AttemptError, ConfigResult, ResilienceError, ResilienceResult};
pub use retry::{
    BackoffConfig, BackoffConfigBuilder, Jitter, Retrier, RetryDecision, RetryPredicate,
};
pub use timeout::{ComplexityThresholds, QueryComplexity, TimeoutConfig, TimeoutManager};
