//! Transport seam between the resilient client and a concrete provider

use async_trait::async_trait;
use lumen_common::resilience::CallContext;
use lumen_domain::ChatCompletionRequest;

use crate::errors::ProviderResult;

/// One embedding as returned by the provider, tagged with its input position
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEmbedding {
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Raw embedding response for one provider request
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    /// In whatever order the provider sent them
    pub data: Vec<IndexedEmbedding>,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatChoice {
    pub content: String,
    pub finish_reason: Option<String>,
}

/// Raw chat completion response for one provider request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub total_tokens: u64,
}

/// A single, unretried request to an LLM provider
///
/// Implementations make exactly one request per call and should give up when
/// `ctx` ends. Retries, deadlines and the breaker are layered on top by
/// [`ResilientClient`](super::ResilientClient).
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Embed `texts` with `model`
    async fn embed(
        &self,
        ctx: &CallContext,
        model: &str,
        texts: &[String],
    ) -> ProviderResult<EmbeddingBatch>;

    /// Run a chat completion; `model` has already been resolved
    async fn chat(
        &self,
        ctx: &CallContext,
        model: &str,
        request: &ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion>;
}
