//! Logging and tracing setup
//!
//! Library code only emits `tracing` events; binaries call [`init_tracing`]
//! once at startup to install a subscriber. `RUST_LOG` wins over the
//! configured filter when set.

use lumen_domain::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber described by `config`
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one is kept and nothing fails.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
        LogFormat::Pretty => {
            registry.with(fmt::layer().with_target(true).with_level(true)).try_init()
        }
    };

    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "tracing subscriber already installed");
            false
        }
    }
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
}
