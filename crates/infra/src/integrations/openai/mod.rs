/// OpenAI integration for embeddings and chat completions
///
/// # Architecture
///
/// - **Client**: `OpenAiTransport` - one HTTP request per call against the
///   `/embeddings` and `/chat/completions` endpoints
/// - **Types**: wire request/response shapes, converted to transport types
///
/// # Usage
///
/// ```no_run
/// use lumen_common::resilience::CallContext;
/// use lumen_infra::http::HttpClient;
/// use lumen_infra::integrations::openai::OpenAiTransport;
/// use lumen_infra::llm::LlmTransport;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let api_key = std::env::var("OPENAI_API_KEY")?;
/// let transport = OpenAiTransport::new(api_key, HttpClient::new()?);
///
/// let texts = vec!["What is the RTO for tier 1?".to_string()];
/// let batch = transport.embed(&CallContext::new(), "text-embedding-3-small", &texts).await?;
/// println!("{} tokens", batch.total_tokens);
/// # Ok(())
/// # }
/// ```
///
/// # Error Handling
///
/// Non-success statuses are mapped at this boundary:
/// - **401/403**: authentication (terminal)
/// - **429**: rate limit, with `retry-after-ms` / `retry-after` honoured
/// - **408/504**: timeout
/// - **Other 5xx**: server error (retryable)
/// - **Other 4xx**: malformed request (terminal)
///
/// Nothing is retried here; wrap the transport in
/// [`ResilientClient`](crate::llm::ResilientClient) for that.
pub mod client;
pub mod types;

pub use client::OpenAiTransport;
