//! Circuit breaker guarding one outbound dependency
//!
//! The breaker counts consecutive failures of calls routed through
//! [`CircuitBreaker::execute`]. Once `max_failures` is reached it opens and
//! rejects calls without invoking them. After `reset_timeout` the next caller
//! becomes the single half-open trial: its success closes the breaker, its
//! failure reopens it and restarts the reset clock.
//!
//! All state lives behind one mutex so each call outcome updates the counter
//! and the state tag together. Construct one breaker per dependency and share
//! it with `Arc`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::context::CallContext;
use super::error::{ConfigResult, ResilienceError, ResilienceResult};
use crate::error::CommonError;

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Production breakers use [`SystemClock`]; tests drive a [`MockClock`] to
/// cross the reset timeout without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        let millis =
            self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a test can keep one handle and
/// hand another to the breaker.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.elapsed()
    }
}

//==============================================================================
// State & Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing a single trial request
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub max_failures: u32,
    /// Time to wait in `Open` before admitting a half-open trial
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { max_failures: 5, reset_timeout: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_failures == 0 {
            return Err(CommonError::config_field("max_failures", "must be greater than 0"));
        }

        if self.reset_timeout.is_zero() {
            return Err(CommonError::config_field("reset_timeout", "must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.config.max_failures = max_failures;
        self
    }

    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.config.reset_timeout = reset_timeout;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Read-only snapshot for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub max_failures: u32,
    #[serde(
        rename = "reset_timeout_ms",
        serialize_with = "crate::utils::serde::duration_millis::serialize"
    )]
    pub reset_timeout: Duration,
    pub total_calls: u64,
    pub rejected_calls: u64,
    /// Wall-clock time of the last recorded failure (ms since epoch)
    pub last_failure_at_ms: Option<u64>,
    /// Wall-clock time of the last state transition (ms since epoch)
    pub last_transition_at_ms: u64,
}

//==============================================================================
// Circuit Breaker
//==============================================================================

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_failure_at_ms: Option<u64>,
    last_transition_at_ms: u64,
    trial_in_flight: bool,
    total_calls: u64,
    rejected_calls: u64,
}

/// Per-dependency circuit breaker
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker for `name` using the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let inner = BreakerInner {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_failure_at_ms: None,
            last_transition_at_ms: clock.millis_since_epoch(),
            trial_in_flight: false,
            total_calls: 0,
            rejected_calls: 0,
        };

        Ok(Self { name: name.into(), config, inner: Mutex::new(inner), clock })
    }

    /// Dependency name used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of counters and timestamps
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            max_failures: self.config.max_failures,
            reset_timeout: self.config.reset_timeout,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_at_ms: inner.last_failure_at_ms,
            last_transition_at_ms: inner.last_transition_at_ms,
        }
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Rejected calls return [`ResilienceError::CircuitOpen`] without invoking
    /// `operation`. Failures caused by the caller's own cancellation or
    /// deadline are not held against the dependency.
    #[instrument(skip_all, fields(dependency = %self.name))]
    pub async fn execute<F, Fut, T, E>(
        &self,
        ctx: &CallContext,
        operation: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResilienceResult<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let Some(permit) = self.try_acquire() else {
            debug!(dependency = %self.name, "circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen { name: self.name.clone() });
        };

        let result = operation().await;
        match &result {
            Ok(_) => permit.succeed(),
            Err(err) if err.is_context_error() => permit.abandon(),
            Err(err) => {
                debug!(dependency = %self.name, error = %err, "circuit breaker recording failure");
                permit.fail();
            }
        }
        result
    }

    fn try_acquire(&self) -> Option<Permit<'_, C>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |opened| now.saturating_duration_since(opened));
                if elapsed < self.config.reset_timeout {
                    inner.rejected_calls += 1;
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.rejected_calls += 1;
                    return None;
                }
                inner.trial_in_flight = true;
                true
            }
        };

        Some(Permit { breaker: self, trial, settled: false })
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
        }

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            // Stale success from a call admitted before the breaker opened
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
        }
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at_ms = Some(self.clock.millis_since_epoch());

        match inner.state {
            CircuitState::Closed if inner.consecutive_failures >= self.config.max_failures => {
                inner.opened_at = Some(now);
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::HalfOpen if trial => {
                inner.opened_at = Some(now);
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn release_trial(&self) {
        self.inner.lock().trial_in_flight = false;
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_transition_at_ms = self.clock.millis_since_epoch();

        match to {
            CircuitState::Open => warn!(
                dependency = %self.name,
                %from,
                %to,
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                dependency = %self.name,
                %from,
                %to,
                "circuit breaker admitting trial call"
            ),
            CircuitState::Closed => info!(
                dependency = %self.name,
                %from,
                %to,
                "circuit breaker closed"
            ),
        }
    }
}

/// Admission for one call; settles the outcome exactly once
struct Permit<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    trial: bool,
    settled: bool,
}

impl<C: Clock> Permit<'_, C> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }

    fn abandon(self) {}
}

impl<C: Clock> Drop for Permit<'_, C> {
    fn drop(&mut self) {
        // Dropped mid-flight or abandoned: free the trial slot, record nothing
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error)]
    #[error("upstream failure")]
    struct Upstream;

    fn breaker(max_failures: u32, clock: MockClock) -> CircuitBreaker<MockClock> {
        let config = CircuitBreakerConfig::builder()
            .max_failures(max_failures)
            .reset_timeout(Duration::from_secs(30))
            .build()
            .expect("valid config");
        CircuitBreaker::with_clock("openai", config, clock).expect("valid breaker")
    }

    async fn fail(cb: &CircuitBreaker<MockClock>) -> ResilienceResult<(), Upstream> {
        cb.execute(&CallContext::new(), || async { Err(ResilienceError::Operation(Upstream)) })
            .await
    }

    async fn succeed(cb: &CircuitBreaker<MockClock>) -> ResilienceResult<u32, Upstream> {
        cb.execute(&CallContext::new(), || async { Ok(7) }).await
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(CircuitBreakerConfig::builder().max_failures(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().reset_timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_mock_clock_shares_elapsed_between_clones() {
        let clock = MockClock::new();
        let handle = clock.clone();
        let before = clock.now();

        handle.advance(Duration::from_secs(5));

        assert_eq!(clock.now().duration_since(before), Duration::from_secs(5));
        assert_eq!(clock.millis_since_epoch(), 5_000);
    }

    /// Validates the breaker opens after exactly `max_failures` consecutive
    /// failures.
    ///
    /// Assertions:
    /// - Stays closed below the threshold.
    /// - Opens on the threshold failure.
    /// - Rejects the next call without invoking the operation.
    #[tokio::test]
    async fn test_opens_after_exactly_max_failures() {
        let cb = breaker(3, MockClock::new());

        assert!(fail(&cb).await.is_err());
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Closed);

        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result: ResilienceResult<(), Upstream> = cb
            .execute(&CallContext::new(), || {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(
            result,
            Err(ResilienceError::CircuitOpen { ref name }) if name == "openai"
        ));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().rejected_calls, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let cb = breaker(3, MockClock::new());

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert!(succeed(&cb).await.is_ok());
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 2);
    }

    /// Validates half-open is only reachable after the reset timeout and that
    /// the trial outcome decides the next state.
    ///
    /// Assertions:
    /// - Still rejecting one tick before the reset timeout.
    /// - A successful trial closes the breaker.
    #[tokio::test]
    async fn test_half_open_after_reset_timeout_then_closes() {
        let clock = MockClock::new();
        let cb = breaker(1, clock.clone());

        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(29));
        assert!(matches!(succeed(&cb).await, Err(ResilienceError::CircuitOpen { .. })));

        clock.advance(Duration::from_secs(1));
        assert_eq!(succeed(&cb).await.expect("trial admitted"), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_failed_trial_reopens_and_restarts_reset_clock() {
        let clock = MockClock::new();
        let cb = breaker(1, clock.clone());

        let _ = fail(&cb).await;
        clock.advance(Duration::from_secs(30));
        assert!(matches!(fail(&cb).await, Err(ResilienceError::Operation(_))));
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(10));
        assert!(matches!(succeed(&cb).await, Err(ResilienceError::CircuitOpen { .. })));

        clock.advance(Duration::from_secs(20));
        assert!(succeed(&cb).await.is_ok());
    }

    /// Validates only one trial call is admitted while half-open.
    ///
    /// Assertions:
    /// - A concurrent caller is rejected while the trial is in flight.
    /// - The trial's success closes the breaker.
    #[tokio::test]
    async fn test_single_trial_in_half_open() {
        let clock = MockClock::new();
        let cb = Arc::new(breaker(1, clock.clone()));

        let _ = fail(&cb).await;
        clock.advance(Duration::from_secs(30));

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_cb = Arc::clone(&cb);
        let trial = tokio::spawn(async move {
            trial_cb
                .execute(&CallContext::new(), || async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, ResilienceError<Upstream>>(1)
                })
                .await
        });

        started_rx.await.expect("trial started");
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(matches!(succeed(&cb).await, Err(ResilienceError::CircuitOpen { .. })));

        release_tx.send(()).expect("trial waiting");
        assert_eq!(trial.await.expect("join").expect("trial ok"), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_caller_cancellation_is_not_a_dependency_failure() {
        let cb = breaker(1, MockClock::new());

        let result: ResilienceResult<(), Upstream> =
            cb.execute(&CallContext::new(), || async { Err(ResilienceError::Cancelled) }).await;

        assert!(result.is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_cancelled_context_is_rejected_before_admission() {
        let cb = breaker(1, MockClock::new());
        let ctx = CallContext::new();
        ctx.cancel();

        let result: ResilienceResult<(), Upstream> = cb.execute(&ctx, || async { Ok(()) }).await;

        assert!(matches!(result, Err(ResilienceError::Cancelled)));
        assert_eq!(cb.stats().total_calls, 0);
    }

    #[tokio::test]
    async fn test_stats_track_failures_and_transitions() {
        let clock = MockClock::new();
        let cb = breaker(2, clock.clone());

        clock.advance(Duration::from_millis(1_500));
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.last_failure_at_ms, Some(1_500));
        assert_eq!(stats.last_transition_at_ms, 1_500);
        assert_eq!(stats.max_failures, 2);
    }

    #[tokio::test]
    async fn test_concurrent_failures_open_once() {
        let cb = Arc::new(breaker(5, MockClock::new()));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let cb = Arc::clone(&cb);
                tokio::spawn(async move {
                    cb.execute(&CallContext::new(), || async {
                        Err::<(), _>(ResilienceError::Operation(Upstream))
                    })
                    .await
                })
            })
            .collect();

        for handle in handles {
            let _ = handle.await;
        }

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.total_calls, 20);
        assert_eq!(u64::from(stats.consecutive_failures) + stats.rejected_calls, 20);
    }
}
