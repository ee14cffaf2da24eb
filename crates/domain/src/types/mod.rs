//! Domain types and models

pub mod chat;
pub mod embedding;
pub mod usage;

pub use chat::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole};
pub use embedding::EmbeddingResult;
pub use usage::{estimate_cost, UsageAccumulator, UsageRecord, UsageTotals};
