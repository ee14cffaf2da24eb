//! Exponential backoff retrier
//!
//! [`Retrier::execute`] runs an operation up to `max_retries + 1` times. The
//! delay before retry `n` is `min(base_delay * multiplier^(n-1), max_delay)`,
//! then randomised by the configured [`Jitter`]. A failed attempt is retried
//! only when the configured predicate accepts the error, the caller context
//! is still live and attempts remain. The backoff sleep races the caller context, so cancelling the
//! caller aborts a pending retry at once.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::context::CallContext;
use super::error::{ConfigResult, ResilienceError, ResilienceResult};
use crate::error::{Classify, CommonError, ErrorKind};

/// Decides whether a failed attempt may be retried
pub type RetryPredicate = Arc<dyn Fn(&dyn Classify) -> bool + Send + Sync>;

/// Randomisation applied to each computed delay
///
/// Jitter only ever shortens a delay, so a jittered delay never exceeds
/// `max_delay`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    /// Sleep exactly the computed delay
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// Uniform in `[delay / 2, delay]`
    #[default]
    Equal,
}

impl Jitter {
    /// Apply this jitter to `delay`
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = delay.as_secs_f64() * 1_000.0;
        let low = match self {
            Self::None => return delay,
            Self::Full => 0.0,
            Self::Equal => millis / 2.0,
        };
        if millis <= low {
            return delay;
        }

        let jittered = rand::thread_rng().gen_range(low..=millis);
        Duration::try_from_secs_f64(jittered / 1_000.0).map_or(delay, |d| d.min(delay))
    }

    /// Shortest delay this jitter can produce from `delay`
    pub fn lower_bound(self, delay: Duration) -> Duration {
        match self {
            Self::None => delay,
            Self::Full => Duration::ZERO,
            Self::Equal => delay / 2,
        }
    }
}

/// Retry decision for one failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay
    RetryAfter(Duration),
    /// Stop and surface the error
    Stop,
}

/// Backoff schedule and retry predicate
#[derive(Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Randomisation that spreads concurrent callers apart
    pub jitter: Jitter,
    predicate: RetryPredicate,
}

impl fmt::Debug for BackoffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffConfig")
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("max_delay", &self.max_delay)
            .field("max_retries", &self.max_retries)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_retries: 3,
            jitter: Jitter::Equal,
            predicate: default_predicate(),
        }
    }
}

fn default_predicate() -> RetryPredicate {
    Arc::new(|err: &dyn Classify| err.is_retryable())
}

impl BackoffConfig {
    /// Create a configuration builder
    pub fn builder() -> BackoffConfigBuilder {
        BackoffConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// `multiplier > 1` and a non-zero `base_delay` keep the pre-jitter
    /// schedule strictly increasing until it reaches `max_delay`.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(CommonError::config_field("multiplier", "must be a finite value > 1.0"));
        }

        if self.base_delay.is_zero() {
            return Err(CommonError::config_field("base_delay", "must be greater than 0"));
        }

        if self.base_delay > self.max_delay {
            return Err(CommonError::config_field(
                "base_delay",
                format!(
                    "must not exceed max_delay ({:?} > {:?})",
                    self.base_delay, self.max_delay
                ),
            ));
        }

        Ok(())
    }

    /// Variant for rate-limit-sensitive workloads such as bulk embedding
    ///
    /// Doubles both delay bounds and always retries rate-limit failures on
    /// top of whatever the current predicate accepts.
    pub fn rate_limit_aware(&self) -> Self {
        let inner = Arc::clone(&self.predicate);
        Self {
            base_delay: self.base_delay.saturating_mul(2),
            max_delay: self.max_delay.saturating_mul(2),
            predicate: Arc::new(move |err: &dyn Classify| {
                err.kind() == ErrorKind::RateLimit || inner(err)
            }),
            ..self.clone()
        }
    }

    /// Whether the predicate accepts this failure
    pub fn should_retry(&self, err: &dyn Classify) -> bool {
        (self.predicate)(err)
    }

    /// Pre-jitter delay before retry `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        Duration::try_from_secs_f64(scaled).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Delay to actually sleep before retry `retry`, jitter and hint applied
    ///
    /// A `retry_after` hint from the dependency raises the delay but never
    /// past `max_delay`.
    pub fn next_delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.jitter.apply(self.delay_for(retry));
        let delay = retry_after.map_or(delay, |hint| delay.max(hint));
        delay.min(self.max_delay)
    }
}

/// Builder for BackoffConfig
#[derive(Debug, Default)]
pub struct BackoffConfigBuilder {
    config: BackoffConfig,
}

impl BackoffConfigBuilder {
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Replace the retry predicate
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&dyn Classify) -> bool + Send + Sync + 'static,
    {
        self.config.predicate = Arc::new(predicate);
        self
    }

    pub fn build(self) -> ConfigResult<BackoffConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runs operations under a [`BackoffConfig`]
#[derive(Debug, Clone)]
pub struct Retrier {
    config: BackoffConfig,
}

impl Retrier {
    /// Create a retrier, validating the configuration
    pub fn new(config: BackoffConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Decide what to do after attempt `attempt` (1-based) failed
    pub fn decide<E>(
        &self,
        ctx: &CallContext,
        err: &ResilienceError<E>,
        attempt: u32,
    ) -> RetryDecision
    where
        E: std::error::Error + Classify + Send + Sync + 'static,
    {
        if ctx.is_done() || err.is_context_error() {
            return RetryDecision::Stop;
        }
        if attempt > self.config.max_retries || !self.config.should_retry(err) {
            return RetryDecision::Stop;
        }
        RetryDecision::RetryAfter(self.config.next_delay(attempt, err.retry_after()))
    }

    /// Run `operation` until it succeeds or a retry is refused
    ///
    /// `operation` receives the 1-based attempt number. Retryable failures
    /// that run out of attempts are wrapped in
    /// [`ResilienceError::RetriesExhausted`]; terminal failures are returned
    /// as-is.
    pub async fn execute<F, Fut, T, E>(
        &self,
        ctx: &CallContext,
        mut operation: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ResilienceResult<T, E>>,
        E: std::error::Error + Classify + Send + Sync + 'static,
    {
        let mut attempt = 0;

        loop {
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }

            attempt += 1;
            debug!(attempt, max_attempts = self.config.max_retries + 1, "executing attempt");

            let err = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            let delay = match self.decide(ctx, &err, attempt) {
                RetryDecision::RetryAfter(delay) => delay,
                RetryDecision::Stop => {
                    return Err(self.give_up(ctx, err, attempt));
                }
            };

            warn!(
                attempt,
                kind = %kind,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "attempt failed, retrying"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                reason = ctx.done() => {
                    debug!(attempt, %reason, "backoff interrupted by caller");
                    return Err(reason.into());
                }
            }
        }
    }

    fn give_up<E>(
        &self,
        ctx: &CallContext,
        err: ResilienceError<E>,
        attempt: u32,
    ) -> ResilienceError<E>
    where
        E: std::error::Error + Classify + Send + Sync + 'static,
    {
        if let Some(reason) = ctx.err() {
            if !err.is_context_error() {
                debug!(attempt, %reason, error = %err, "caller context ended during attempt");
            }
            return reason.into();
        }

        if attempt > self.config.max_retries && self.config.should_retry(&err) {
            warn!(attempts = attempt, kind = %err.kind(), error = %err, "retry attempts exhausted");
            return match err.into_attempt_error() {
                Ok(last) => ResilienceError::RetriesExhausted { attempts: attempt, last },
                Err(err) => err,
            };
        }

        debug!(attempt, kind = %err.kind(), error = %err, "error is not retryable");
        err
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use thiserror::Error;

    use super::*;
    use crate::resilience::error::AttemptError;

    #[derive(Debug, Error)]
    enum Raw {
        #[error("too many requests")]
        Throttled,
        #[error("connection reset")]
        Reset,
        #[error("invalid api key")]
        Auth,
    }

    impl Classify for Raw {
        fn kind(&self) -> ErrorKind {
            match self {
                Self::Throttled => ErrorKind::RateLimit,
                Self::Reset => ErrorKind::Connection,
                Self::Auth => ErrorKind::Authentication,
            }
        }
    }

    fn fast(max_retries: u32) -> Retrier {
        let config = BackoffConfig::builder()
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .max_retries(max_retries)
            .jitter(Jitter::None)
            .build()
            .expect("valid config");
        Retrier::new(config).expect("valid retrier")
    }

    /// Validates the pre-jitter schedule grows geometrically and caps.
    ///
    /// Assertions:
    /// - Delays are 100ms, 200ms, 400ms, 800ms before the cap.
    /// - Every delay stays within `max_delay`.
    #[test]
    fn test_delay_schedule_grows_then_caps() {
        let config = BackoffConfig::builder()
            .base_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(1))
            .build()
            .expect("valid config");

        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(400));
        assert_eq!(config.delay_for(4), Duration::from_millis(800));
        assert_eq!(config.delay_for(5), Duration::from_secs(1));
        assert_eq!(config.delay_for(60), Duration::from_secs(1));

        let delays: Vec<_> = (1..=4).map(|n| config.delay_for(n)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_jittered_delay_never_exceeds_max() {
        let config = BackoffConfig::builder()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(300))
            .jitter(Jitter::Equal)
            .build()
            .expect("valid config");

        for retry in 1..=10 {
            for _ in 0..50 {
                let delay = config.next_delay(retry, None);
                assert!(delay <= Duration::from_millis(300), "retry {retry}: {delay:?}");
            }
        }
    }

    #[test]
    fn test_retry_after_hint_raises_delay_up_to_max() {
        let config = BackoffConfig::builder()
            .base_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(500))
            .jitter(Jitter::None)
            .build()
            .expect("valid config");

        assert_eq!(
            config.next_delay(1, Some(Duration::from_millis(200))),
            Duration::from_millis(200)
        );
        assert_eq!(config.next_delay(1, Some(Duration::from_secs(60))), Duration::from_millis(500));
    }

    /// Validates each jitter shape stays inside its documented band.
    ///
    /// Assertions:
    /// - `None` returns the delay unchanged.
    /// - `Equal` stays within `[delay / 2, delay]`.
    /// - `Full` stays within `[0, delay]`.
    #[test]
    fn test_jitter_bands() {
        let delay = Duration::from_millis(400);
        assert_eq!(Jitter::None.apply(delay), delay);

        for _ in 0..200 {
            let equal = Jitter::Equal.apply(delay);
            assert!(equal >= Jitter::Equal.lower_bound(delay) && equal <= delay, "{equal:?}");

            let full = Jitter::Full.apply(delay);
            assert!(full <= delay, "{full:?}");
        }
        assert_eq!(Jitter::Equal.lower_bound(delay), Duration::from_millis(200));
        assert_eq!(Jitter::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_unbounded_max_delay_does_not_overflow() {
        let config = BackoffConfig::builder()
            .base_delay(Duration::from_secs(1))
            .max_delay(Duration::MAX)
            .jitter(Jitter::Equal)
            .build()
            .expect("valid config");

        for _ in 0..100 {
            let delay = config.next_delay(200, None);
            assert!(delay <= Duration::MAX);
            assert!(delay >= Duration::from_secs(1));
        }
        assert_eq!(config.delay_for(200), Duration::MAX);
        assert_eq!(config.next_delay(1, Some(Duration::MAX)), Duration::MAX);
        assert_eq!(config.rate_limit_aware().max_delay, Duration::MAX);
    }

    #[test]
    fn test_config_validation() {
        assert!(BackoffConfig::builder().multiplier(0.5).build().is_err());
        assert!(BackoffConfig::builder().multiplier(f64::NAN).build().is_err());
        assert!(BackoffConfig::builder().multiplier(1.0).build().is_err());
        assert!(BackoffConfig::builder().base_delay(Duration::ZERO).build().is_err());
        assert!(BackoffConfig::builder().multiplier(1.01).build().is_ok());
        assert!(BackoffConfig::builder()
            .base_delay(Duration::from_secs(10))
            .max_delay(Duration::from_secs(1))
            .build()
            .is_err());
    }

    #[test]
    fn test_rate_limit_aware_doubles_bounds_and_retries_rate_limits() {
        let base = BackoffConfig::builder()
            .base_delay(Duration::from_millis(500))
            .max_delay(Duration::from_secs(10))
            .retry_if(|_| false)
            .build()
            .expect("valid config");

        let aware = base.rate_limit_aware();

        assert_eq!(aware.base_delay, Duration::from_secs(1));
        assert_eq!(aware.max_delay, Duration::from_secs(20));
        assert_eq!(aware.max_retries, base.max_retries);
        assert!(!base.should_retry(&Raw::Throttled));
        assert!(aware.should_retry(&Raw::Throttled));
        assert!(!aware.should_retry(&Raw::Auth));
    }

    #[tokio::test]
    async fn test_retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);

        let result = fast(3)
            .execute(&CallContext::new(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(ResilienceError::Operation(Raw::Reset))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_on_first_attempt() {
        let calls = AtomicU32::new(0);

        let result: ResilienceResult<(), Raw> = fast(3)
            .execute(&CallContext::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ResilienceError::Operation(Raw::Auth)) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Operation(Raw::Auth))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Validates exhaustion after `max_retries + 1` attempts.
    ///
    /// Assertions:
    /// - The operation runs exactly three times for `max_retries = 2`.
    /// - The error reports the attempt count and keeps the last kind.
    #[tokio::test]
    async fn test_exhausts_after_max_retries_plus_one() {
        let calls = AtomicU32::new(0);

        let result: ResilienceResult<(), Raw> = fast(2)
            .execute(&CallContext::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ResilienceError::Operation(Raw::Throttled)) }
            })
            .await;

        let err = result.expect_err("all attempts fail");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert!(matches!(
            err,
            ResilienceError::RetriesExhausted { last: AttemptError::Operation(Raw::Throttled), .. }
        ));
    }

    #[tokio::test]
    async fn test_per_attempt_timeout_is_retried() {
        let result = fast(1)
            .execute(&CallContext::new(), |attempt| async move {
                if attempt == 1 {
                    Err(ResilienceError::<Raw>::Timeout { timeout: Duration::from_millis(5) })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.expect("second attempt succeeds"), "done");
    }

    #[tokio::test]
    async fn test_cancelled_context_is_never_retried() {
        let ctx = CallContext::new();
        let calls = AtomicU32::new(0);

        let result: ResilienceResult<(), Raw> = fast(5)
            .execute(&ctx, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                ctx.cancel();
                async { Err(ResilienceError::Operation(Raw::Reset)) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Validates cancelling the caller aborts a pending backoff sleep.
    ///
    /// Assertions:
    /// - Returns `Cancelled` well before the 10s backoff would end.
    /// - The operation is not invoked again.
    #[tokio::test]
    async fn test_cancellation_interrupts_backoff_sleep() {
        let config = BackoffConfig::builder()
            .base_delay(Duration::from_secs(10))
            .max_delay(Duration::from_secs(10))
            .jitter(Jitter::None)
            .build()
            .expect("valid config");
        let retrier = Retrier::new(config).expect("valid retrier");
        let ctx = CallContext::new();
        let calls = AtomicU32::new(0);

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result: ResilienceResult<(), Raw> = retrier
            .execute(&ctx, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ResilienceError::Operation(Raw::Throttled)) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
