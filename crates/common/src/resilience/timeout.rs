//! Per-attempt deadlines, static or adaptive
//!
//! In static mode every attempt gets `base`. In adaptive mode the deadline is
//! picked from the request's [`QueryComplexity`]. Either way the attempt runs
//! under a child [`CallContext`] whose deadline never outlives the caller's.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::context::CallContext;
use super::error::{ConfigResult, ResilienceError, ResilienceResult};
use crate::error::CommonError;

/// Thresholds for [`QueryComplexity::classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexityThresholds {
    /// More context items than this makes a request complex
    pub complex_items: usize,
    /// Text longer than this (chars) makes a request complex
    pub complex_length: usize,
    /// Text no longer than this, with no context items, is simple
    pub simple_length: usize,
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self { complex_items: 8, complex_length: 400, simple_length: 100 }
    }
}

/// Request complexity, derived per request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryComplexity {
    Simple,
    Medium,
    Complex,
}

impl QueryComplexity {
    /// Classify a request from its text length and number of context items
    pub fn classify(
        text_len: usize,
        context_items: usize,
        thresholds: &ComplexityThresholds,
    ) -> Self {
        if context_items > thresholds.complex_items || text_len > thresholds.complex_length {
            Self::Complex
        } else if context_items == 0 && text_len <= thresholds.simple_length {
            Self::Simple
        } else {
            Self::Medium
        }
    }
}

/// Timeout settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub base: Duration,
    pub simple: Duration,
    pub complex: Duration,
    /// Pick the deadline from request complexity instead of always `base`
    pub adaptive: bool,
    pub thresholds: ComplexityThresholds,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            simple: Duration::from_secs(20),
            complex: Duration::from_secs(90),
            adaptive: true,
            thresholds: ComplexityThresholds::default(),
        }
    }
}

impl TimeoutConfig {
    /// Static mode: every attempt gets `base`
    pub fn fixed(base: Duration) -> Self {
        Self { base, simple: base, complex: base, adaptive: false, ..Self::default() }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.simple.is_zero() || self.base.is_zero() || self.complex.is_zero() {
            return Err(CommonError::config("timeouts must be greater than 0"));
        }

        Ok(())
    }
}

/// Applies per-attempt deadlines
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    config: TimeoutConfig,
}

impl TimeoutManager {
    /// Create a manager, validating the configuration
    pub fn new(config: TimeoutConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// Deadline for a request of the given complexity
    pub fn timeout_for(&self, complexity: QueryComplexity) -> Duration {
        if !self.config.adaptive {
            return self.config.base;
        }

        match complexity {
            QueryComplexity::Simple => self.config.simple,
            QueryComplexity::Medium => self.config.base,
            QueryComplexity::Complex => self.config.complex,
        }
    }

    /// Deadline for a request with the given shape
    pub fn timeout_for_request(&self, text_len: usize, context_items: usize) -> Duration {
        let complexity =
            QueryComplexity::classify(text_len, context_items, &self.config.thresholds);
        self.timeout_for(complexity)
    }

    /// Run `operation` under a derived deadline
    ///
    /// `operation` receives the child context and should pass it to any I/O
    /// it starts. On expiry the child context is cancelled and the in-flight
    /// future is dropped. Expiry of the caller's own deadline or cancellation
    /// is reported as such; expiry of the per-attempt deadline alone is
    /// [`ResilienceError::Timeout`].
    pub async fn execute<F, Fut, T, E>(
        &self,
        ctx: &CallContext,
        complexity: QueryComplexity,
        operation: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = ResilienceResult<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let timeout = self.timeout_for(complexity);
        let attempt_ctx = ctx.with_timeout(timeout);
        debug!(?complexity, ?timeout, "attempt deadline");

        tokio::select! {
            result = operation(attempt_ctx.clone()) => match result {
                // The operation saw the attempt context end; unless the caller's
                // own context ended too, that is this stage's deadline.
                Err(err) if err.is_context_error() && !ctx.is_done() => {
                    warn!(?complexity, ?timeout, "attempt timed out");
                    Err(ResilienceError::Timeout { timeout })
                }
                other => other,
            },
            _ = attempt_ctx.done() => {
                attempt_ctx.cancel();
                if let Some(reason) = ctx.err() {
                    debug!(%reason, "caller context ended during attempt");
                    return Err(reason.into());
                }
                warn!(?complexity, ?timeout, "attempt timed out");
                Err(ResilienceError::Timeout { timeout })
            }
        }
    }
}
