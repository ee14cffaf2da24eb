//! # Lumen Infrastructure
//!
//! Resilient LLM execution layer.
//!
//! This crate contains:
//! - [`ResilientClient`]: embeddings and chat completions behind a circuit
//!   breaker, retry with backoff, and per-attempt timeouts
//! - The OpenAI-compatible HTTP transport
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Resilience primitives live in `lumen-common`
//! - Request/response and config types live in `lumen-domain`
//! - Everything that performs I/O lives here

pub mod config;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod llm;
pub mod observability;

pub use errors::{IntoLumenError, ProviderError, ProviderResult};
pub use http::{HttpClient, HttpClientBuilder};
pub use integrations::openai::OpenAiTransport;
pub use llm::*;
pub use observability::init_tracing;
