//! Resilient access to the LLM provider
//!
//! - **[`LlmTransport`]**: one unretried provider request
//! - **[`ResilientClient`]**: breaker, retries and deadlines around a
//!   transport, plus response validation and usage accounting
//! - **[`HealthReport`]**: result of the health check

pub mod health;
pub mod resilient;
pub mod transport;
pub mod usage;

pub use health::{HealthReport, HealthStatus};
pub use resilient::{ResilientClient, PROVIDER_DEPENDENCY};
pub use transport::{ChatChoice, ChatCompletion, EmbeddingBatch, IndexedEmbedding, LlmTransport};
pub use usage::UsageTracker;
