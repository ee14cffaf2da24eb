//! Resilient LLM client
//!
//! Every provider request runs through the same stack:
//!
//! ```text
//! CircuitBreaker ─▶ Retrier ─▶ TimeoutManager ─▶ LlmTransport
//! ```
//!
//! The breaker sees one outcome per provider request and fails fast without
//! starting a retry sequence. The retrier is the only layer that loops, and
//! each attempt gets a fresh deadline from the timeout manager. Response
//! validation (vector count, dimensionality, non-empty choices) runs inside
//! the attempt, so a malformed response is a terminal operation error rather
//! than something worth retrying.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use lumen_common::error::Classify;
use lumen_common::resilience::{
    BackoffConfig, CallContext, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, Clock,
    ComplexityThresholds, Jitter, QueryComplexity, ResilienceError, ResilienceResult, Retrier,
    SystemClock, TimeoutConfig, TimeoutManager,
};
use lumen_domain::constants::HEALTH_CHECK_INPUT;
use lumen_domain::{
    ChatCompletionRequest, ChatCompletionResponse, EmbeddingResult, LumenConfig, LumenError,
    ProviderConfig, ResilienceSettings, Result, UsageAccumulator, UsageRecord, UsageTotals,
};
use tracing::{debug, field, info, instrument, warn, Span};
use uuid::Uuid;

use super::health::{HealthReport, HealthStatus};
use super::transport::{ChatChoice, ChatCompletion, EmbeddingBatch, LlmTransport};
use super::usage::UsageTracker;
use crate::errors::{IntoLumenError, ProviderError, ProviderResult};
use crate::integrations::openai::OpenAiTransport;

/// Breaker name for the LLM provider dependency
pub const PROVIDER_DEPENDENCY: &str = "llm-provider";

/// LLM client guarded by a circuit breaker, retries and per-attempt
/// deadlines
pub struct ResilientClient<C: Clock = SystemClock> {
    transport: Arc<dyn LlmTransport>,
    breaker: Arc<CircuitBreaker<C>>,
    /// Chat and other single requests
    retrier: Retrier,
    /// Rate-limit-aware variant for embedding batches
    bulk_retrier: Retrier,
    timeouts: TimeoutManager,
    provider: ProviderConfig,
    usage: UsageTracker,
}

impl ResilientClient<SystemClock> {
    /// Client over the OpenAI transport described by `config.provider`
    ///
    /// # Errors
    /// Returns `LumenError::Config` when the API key is missing or any stage
    /// setting is invalid.
    pub fn new(config: &LumenConfig) -> Result<Self> {
        if config.provider.api_key.trim().is_empty() {
            return Err(LumenError::Config("provider.api_key is required".to_string()));
        }

        let transport = OpenAiTransport::from_config(&config.provider)
            .map_err(|e| LumenError::Config(format!("failed to build HTTP client: {e}")))?;
        Self::with_transport(Arc::new(transport), config)
    }

    /// Client over any transport, with a breaker created for it
    pub fn with_transport(transport: Arc<dyn LlmTransport>, config: &LumenConfig) -> Result<Self> {
        let breaker =
            CircuitBreaker::new(PROVIDER_DEPENDENCY, breaker_config(&config.resilience))
                .map_err(IntoLumenError::into_lumen)?;
        Self::with_breaker(transport, Arc::new(breaker), config)
    }
}

impl<C: Clock> ResilientClient<C> {
    /// Client sharing an existing breaker
    ///
    /// Use this when several clients call the same dependency: the breaker
    /// must be one per dependency, not one per client.
    pub fn with_breaker(
        transport: Arc<dyn LlmTransport>,
        breaker: Arc<CircuitBreaker<C>>,
        config: &LumenConfig,
    ) -> Result<Self> {
        validate_provider(&config.provider)?;

        let backoff = backoff_config(&config.resilience).map_err(IntoLumenError::into_lumen)?;
        let bulk_backoff = backoff.rate_limit_aware();

        Ok(Self {
            transport,
            breaker,
            retrier: Retrier::new(backoff).map_err(IntoLumenError::into_lumen)?,
            bulk_retrier: Retrier::new(bulk_backoff).map_err(IntoLumenError::into_lumen)?,
            timeouts: TimeoutManager::new(timeout_config(&config.resilience))
                .map_err(IntoLumenError::into_lumen)?,
            provider: config.provider.clone(),
            usage: UsageTracker::new(),
        })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }

    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    /// Usage accumulated by this client since construction
    pub fn usage_totals(&self) -> UsageTotals {
        self.usage.totals()
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Embed `texts`, preserving order
    ///
    /// Empty input returns an empty result without touching the network.
    /// Inputs above `max_batch_size` are sent as sequential requests, each
    /// through the full stack.
    ///
    /// # Errors
    /// Fails on the first batch that fails; earlier batches are discarded.
    #[instrument(skip_all, fields(call_id = field::Empty, texts = texts.len()))]
    pub async fn embed_texts(
        &self,
        ctx: &CallContext,
        texts: &[String],
    ) -> Result<EmbeddingResult> {
        let call_id = Uuid::now_v7();
        Span::current().record("call_id", field::display(call_id));

        if texts.is_empty() {
            return Ok(EmbeddingResult {
                embeddings: Vec::new(),
                usage: UsageRecord::empty(call_id),
            });
        }

        let started = Instant::now();
        let mut usage = UsageAccumulator::new(call_id);
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.provider.max_batch_size) {
            match self.embed_batch(ctx, batch).await {
                Ok((vectors, tokens)) => {
                    usage.add_request(tokens);
                    embeddings.extend(vectors);
                }
                Err(err) => return Err(self.fail(err)),
            }
        }

        let usage = usage.finish(started.elapsed(), self.provider.cost_per_1k_tokens);
        self.usage.record(&usage);
        info!(
            tokens = usage.tokens_used,
            requests = usage.request_count,
            cost = usage.estimated_cost,
            elapsed_ms = elapsed_ms(&usage),
            "embeddings complete"
        );

        Ok(EmbeddingResult { embeddings, usage })
    }

    /// Run a chat completion
    ///
    /// The adaptive deadline is chosen from the last user message and
    /// `request.context_items`.
    ///
    /// # Errors
    /// A response without choices is a terminal `LumenError::Internal`.
    #[instrument(skip_all, fields(call_id = field::Empty, messages = request.messages.len()))]
    pub async fn create_chat_completion(
        &self,
        ctx: &CallContext,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let call_id = Uuid::now_v7();
        Span::current().record("call_id", field::display(call_id));

        if request.messages.is_empty() {
            return Err(LumenError::Validation(
                "chat completion needs at least one message".to_string(),
            ));
        }

        let started = Instant::now();
        let model = request.model.as_deref().unwrap_or(&self.provider.chat_model);
        let complexity = QueryComplexity::classify(
            request.query().chars().count(),
            request.context_items,
            &self.timeouts.config().thresholds,
        );
        let transport = self.transport.as_ref();

        let result = self
            .breaker
            .execute(ctx, || {
                self.retrier.execute(ctx, |_attempt| {
                    self.timeouts.execute(ctx, complexity, move |attempt_ctx| async move {
                        let completion =
                            transport.chat(&attempt_ctx, model, request).await.map_err(lift)?;
                        first_choice(completion).map_err(ResilienceError::Operation)
                    })
                })
            })
            .await;

        let (choice, model_used, tokens) = result.map_err(|err| self.fail(err))?;

        let mut usage = UsageAccumulator::new(call_id);
        usage.add_request(tokens);
        let usage = usage.finish(started.elapsed(), self.provider.cost_per_1k_tokens);
        self.usage.record(&usage);
        info!(
            tokens = usage.tokens_used,
            cost = usage.estimated_cost,
            elapsed_ms = elapsed_ms(&usage),
            ?complexity,
            "chat completion complete"
        );

        Ok(ChatCompletionResponse {
            content: choice.content,
            finish_reason: choice.finish_reason,
            model: if model_used.is_empty() { model.to_string() } else { model_used },
            usage,
        })
    }

    /// Embed a single query string
    ///
    /// # Errors
    /// Empty (or whitespace-only) text is a terminal `LumenError::Validation`.
    pub async fn embed_query(&self, ctx: &CallContext, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(LumenError::Validation("query text must not be empty".to_string()));
        }

        let result = self.embed_texts(ctx, &[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LumenError::Internal("provider returned no embedding".to_string()))
    }

    /// One lightweight embedding through the full stack
    ///
    /// Never fails: problems are reported as [`HealthStatus::Unhealthy`].
    /// The check goes through the same breaker as real traffic, so an open
    /// breaker reports unhealthy without calling the provider.
    #[instrument(skip_all)]
    pub async fn health_check(&self, ctx: &CallContext) -> HealthReport {
        let started = Instant::now();
        let outcome = self.embed_texts(ctx, &[HEALTH_CHECK_INPUT.to_string()]).await;
        let latency = started.elapsed();

        let (status, error) = match outcome {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(err) => {
                warn!(error = %err, "health check failed");
                (HealthStatus::Unhealthy, Some(err.to_string()))
            }
        };

        HealthReport {
            status,
            latency,
            breaker: self.breaker.stats(),
            error,
            checked_at: Utc::now(),
        }
    }

    /// One embedding request through breaker → retrier → timeout
    async fn embed_batch(
        &self,
        ctx: &CallContext,
        batch: &[String],
    ) -> ResilienceResult<(Vec<Vec<f32>>, u64), ProviderError> {
        let complexity = embedding_complexity(batch, &self.timeouts.config().thresholds);
        let model = self.provider.embedding_model.as_str();
        let dimensions = self.provider.dimensions;
        let transport = self.transport.as_ref();
        debug!(batch = batch.len(), ?complexity, "embedding batch");

        self.breaker
            .execute(ctx, || {
                self.bulk_retrier.execute(ctx, |_attempt| {
                    self.timeouts.execute(ctx, complexity, move |attempt_ctx| async move {
                        let response =
                            transport.embed(&attempt_ctx, model, batch).await.map_err(lift)?;
                        validate_embeddings(response, batch.len(), dimensions)
                            .map_err(ResilienceError::Operation)
                    })
                })
            })
            .await
    }

    fn fail(&self, err: ResilienceError<ProviderError>) -> LumenError {
        self.usage.record_failure();
        let kind = err.kind();
        let attempts = err.attempts();
        let mapped = err.into_lumen();
        warn!(%kind, ?attempts, error = %mapped, "call failed");
        mapped
    }
}

/// Context errors reported by the transport belong to the stages, not the
/// provider
fn lift(err: ProviderError) -> ResilienceError<ProviderError> {
    match err {
        ProviderError::Context(reason) => reason.into(),
        other => ResilienceError::Operation(other),
    }
}

/// Order vectors by input position and check count and dimensionality
fn validate_embeddings(
    batch: EmbeddingBatch,
    expected: usize,
    dimensions: usize,
) -> ProviderResult<(Vec<Vec<f32>>, u64)> {
    if batch.data.len() != expected {
        return Err(ProviderError::CountMismatch { expected, actual: batch.data.len() });
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in batch.data {
        if item.embedding.len() != dimensions {
            return Err(ProviderError::DimensionMismatch {
                index: item.index,
                expected: dimensions,
                actual: item.embedding.len(),
            });
        }

        let Some(slot) = slots.get_mut(item.index) else {
            return Err(ProviderError::InvalidResponse(format!(
                "embedding index {} out of range for {expected} inputs",
                item.index
            )));
        };
        if slot.is_some() {
            return Err(ProviderError::InvalidResponse(format!(
                "duplicate embedding index {}",
                item.index
            )));
        }
        *slot = Some(item.embedding);
    }

    // Count matches and indices are unique and in range, so every slot is
    // filled.
    let vectors = slots.into_iter().flatten().collect();
    Ok((vectors, batch.total_tokens))
}

fn first_choice(completion: ChatCompletion) -> ProviderResult<(ChatChoice, String, u64)> {
    let ChatCompletion { model, choices, total_tokens } = completion;
    let choice = choices.into_iter().next().ok_or(ProviderError::EmptyChoices)?;
    Ok((choice, model, total_tokens))
}

/// Batches are complex by item count; a single text by its length
fn embedding_complexity(batch: &[String], thresholds: &ComplexityThresholds) -> QueryComplexity {
    let items = if batch.len() > 1 { batch.len() } else { 0 };
    let longest = batch.iter().map(|t| t.chars().count()).max().unwrap_or(0);
    QueryComplexity::classify(longest, items, thresholds)
}

fn elapsed_ms(usage: &UsageRecord) -> u64 {
    u64::try_from(usage.processing_time.as_millis()).unwrap_or(u64::MAX)
}

fn validate_provider(provider: &ProviderConfig) -> Result<()> {
    if provider.dimensions == 0 {
        return Err(LumenError::Config("provider.dimensions must be greater than 0".to_string()));
    }
    if provider.max_batch_size == 0 {
        return Err(LumenError::Config(
            "provider.max_batch_size must be greater than 0".to_string(),
        ));
    }
    if !provider.cost_per_1k_tokens.is_finite() || provider.cost_per_1k_tokens < 0.0 {
        return Err(LumenError::Config(
            "provider.cost_per_1k_tokens must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn breaker_config(settings: &ResilienceSettings) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        max_failures: settings.circuit_breaker.max_failures,
        reset_timeout: settings.circuit_breaker.reset_timeout(),
    }
}

fn backoff_config(
    settings: &ResilienceSettings,
) -> std::result::Result<BackoffConfig, lumen_common::CommonError> {
    let backoff = &settings.backoff;
    BackoffConfig::builder()
        .base_delay(backoff.base_delay())
        .multiplier(backoff.multiplier)
        .max_delay(backoff.max_delay())
        .max_retries(backoff.max_retries)
        .jitter(if backoff.jitter { Jitter::Equal } else { Jitter::None })
        .build()
}

fn timeout_config(settings: &ResilienceSettings) -> TimeoutConfig {
    let timeout = &settings.timeout;
    TimeoutConfig {
        base: timeout.base(),
        simple: timeout.simple(),
        complex: timeout.complex(),
        adaptive: timeout.adaptive,
        thresholds: ComplexityThresholds::default(),
    }
}
