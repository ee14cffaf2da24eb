//! Application constants
//!
//! Centralized location for all domain-level defaults used throughout the
//! workspace.

// Provider defaults
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_COST_PER_1K_TOKENS: f64 = 0.000_02;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_USER_AGENT: &str = concat!("lumen/", env!("CARGO_PKG_VERSION"));

// Circuit breaker
pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 60_000;

// Backoff
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// Timeouts
pub const DEFAULT_BASE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_SIMPLE_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_COMPLEX_TIMEOUT_MS: u64 = 90_000;

// Health check
pub const HEALTH_CHECK_INPUT: &str = "health check";

// Logging
pub const DEFAULT_LOG_FILTER: &str = "lumen=info";
