//! Common error types and classification for Lumen crates
//!
//! This module provides the error vocabulary shared by every crate in the
//! workspace:
//!
//! 1. **`CommonError`**: configuration failures raised while building the
//!    resilience stages.
//!
//! 2. **`ErrorKind` + [`classify`]**: the semantic failure taxonomy that
//!    drives retry and propagation decisions in the resilience layer (see
//!    [`kind`]).
//!
//! ## Composition
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum ProviderError {
//!     #[error("Invalid embedding dimensions: {0}")]
//!     Dimensions(String),
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//!
//! impl Classify for ProviderError {
//!     fn kind(&self) -> ErrorKind {
//!         match self {
//!             Self::Dimensions(_) => ErrorKind::Unknown,
//!             Self::Common(e) => e.kind(),
//!         }
//!     }
//! }
//! ```

pub mod kind;

use thiserror::Error;

pub use kind::{classify, classify_message, Classify, ContextError, ErrorKind};

/// Errors shared across modules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// Invalid configuration, optionally pinned to one field
    #[error("Configuration error{}: {message}", field_suffix(.field))]
    Config { message: String, field: Option<String> },
}

fn field_suffix(field: &Option<String>) -> String {
    field.as_ref().map(|field| format!(" in field '{field}'")).unwrap_or_default()
}

impl Classify for CommonError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Unknown,
        }
    }
}

impl CommonError {
    /// Create a simple configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Offending field, when known
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Config { field, .. } => field.as_deref(),
        }
    }
}
