//! OpenAI transport for embeddings and chat completions

use std::time::Duration;

use async_trait::async_trait;
use lumen_common::resilience::CallContext;
use lumen_domain::{ChatCompletionRequest, ProviderConfig};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::{ApiErrorBody, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse};
use crate::errors::{ProviderError, ProviderResult};
use crate::http::HttpClient;
use crate::llm::transport::{ChatCompletion, EmbeddingBatch, LlmTransport};

const EMBEDDINGS_PATH: &str = "embeddings";
const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// Longest provider error body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// OpenAI-compatible [`LlmTransport`]
pub struct OpenAiTransport {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
}

impl OpenAiTransport {
    /// Create a transport against the public OpenAI API
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key (required)
    /// * `http_client` - Single-shot HTTP client
    pub fn new(api_key: impl Into<String>, http_client: HttpClient) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: lumen_domain::constants::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Build a transport from provider settings
    ///
    /// # Errors
    /// Returns `ProviderError::Http` if the HTTP client cannot be built.
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .user_agent(lumen_domain::constants::DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self::new(config.api_key.clone(), http_client).with_base_url(&config.base_url))
    }

    /// Point the transport at another OpenAI-compatible endpoint
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` and decode a successful response
    async fn post<B, R>(&self, ctx: &CallContext, path: &str, body: &B) -> ProviderResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        let mut builder = self
            .http_client
            .request(Method::POST, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body);
        if let Some(remaining) = ctx.remaining() {
            builder = builder.timeout(remaining);
        }

        let response = tokio::select! {
            result = self.http_client.send(builder) => result?,
            reason = ctx.done() => return Err(reason.into()),
        };

        let status = response.status();
        debug!(status = status.as_u16(), path, "received provider response");

        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let message = error_message(&response.text().await.unwrap_or_default());
            return Err(ProviderError::from_status(status.as_u16(), message, retry_after));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to parse {path} response: {e}"))
        })
    }
}

#[async_trait]
impl LlmTransport for OpenAiTransport {
    async fn embed(
        &self,
        ctx: &CallContext,
        model: &str,
        texts: &[String],
    ) -> ProviderResult<EmbeddingBatch> {
        let request = EmbeddingRequest { model, input: texts, encoding_format: "float" };
        let response: EmbeddingResponse = self.post(ctx, EMBEDDINGS_PATH, &request).await?;
        Ok(response.into())
    }

    async fn chat(
        &self,
        ctx: &CallContext,
        model: &str,
        request: &ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion> {
        let payload = ChatRequest {
            model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let response: ChatResponse = self.post(ctx, CHAT_COMPLETIONS_PATH, &payload).await?;
        Ok(response.into())
    }
}

/// `Retry-After` hint: `retry-after-ms` when present, else whole seconds in
/// `retry-after`
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let read =
        |name: &str| -> Option<f64> { headers.get(name)?.to_str().ok()?.trim().parse().ok() };

    if let Some(ms) = read("retry-after-ms").filter(|v| v.is_finite() && *v >= 0.0) {
        return Some(Duration::from_secs_f64(ms / 1_000.0));
    }
    read("retry-after")
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Message from the provider's error envelope, or the truncated raw body
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return match parsed.error.kind {
            Some(kind) => format!("{} ({kind})", parsed.error.message),
            None => parsed.error.message,
        };
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
