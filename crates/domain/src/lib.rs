//! # Lumen Domain
//!
//! Domain types and models for the Lumen LLM execution layer.
//!
//! This crate contains:
//! - Embedding, chat and usage types exchanged with callers
//! - The caller-facing error type and Result definition
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Lumen crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
