//! Configuration loader
//!
//! Loads [`LumenConfig`] from environment variables or a config file.
//!
//! ## Loading Strategy
//! 1. If `LUMEN_API_KEY` is set, loads from environment variables; an
//!    invalid override is an error, never a silent fallback
//! 2. Otherwise falls back to a config file
//! 3. Searches multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! `LUMEN_API_KEY` is required. Everything else is optional and overrides the
//! built-in default:
//! - `LUMEN_BASE_URL`, `LUMEN_EMBEDDING_MODEL`, `LUMEN_CHAT_MODEL`
//! - `LUMEN_EMBEDDING_DIMENSIONS`, `LUMEN_MAX_BATCH_SIZE`,
//!   `LUMEN_COST_PER_1K_TOKENS`, `LUMEN_REQUEST_TIMEOUT_MS`
//! - `LUMEN_MAX_FAILURES`, `LUMEN_RESET_TIMEOUT_MS`
//! - `LUMEN_BASE_DELAY_MS`, `LUMEN_BACKOFF_MULTIPLIER`, `LUMEN_MAX_DELAY_MS`,
//!   `LUMEN_MAX_RETRIES`, `LUMEN_JITTER`
//! - `LUMEN_BASE_TIMEOUT_MS`, `LUMEN_SIMPLE_TIMEOUT_MS`,
//!   `LUMEN_COMPLEX_TIMEOUT_MS`, `LUMEN_ADAPTIVE_TIMEOUT`
//! - `LUMEN_LOG_FILTER`, `LUMEN_LOG_FORMAT` (`pretty` or `json`)
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./lumen.json` or `./lumen.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lumen_domain::{LogFormat, LumenConfig, LumenError, Result};

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `LumenError::Config` if an environment override is invalid, or if
/// `LUMEN_API_KEY` is unset and no usable config file is found.
pub fn load() -> Result<LumenConfig> {
    if env_opt("LUMEN_API_KEY").is_none() {
        tracing::debug!("LUMEN_API_KEY not set, trying file");
        return load_from_file(None);
    }

    let config = load_from_env()?;
    tracing::info!("Configuration loaded from environment variables");
    Ok(config)
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `LumenError::Config` if `LUMEN_API_KEY` is missing or an
/// override cannot be parsed.
pub fn load_from_env() -> Result<LumenConfig> {
    let mut config = LumenConfig::default();

    let provider = &mut config.provider;
    provider.api_key = env_var("LUMEN_API_KEY")?;
    if let Some(url) = env_opt("LUMEN_BASE_URL") {
        provider.base_url = url;
    }
    if let Some(model) = env_opt("LUMEN_EMBEDDING_MODEL") {
        provider.embedding_model = model;
    }
    if let Some(model) = env_opt("LUMEN_CHAT_MODEL") {
        provider.chat_model = model;
    }
    env_parse("LUMEN_EMBEDDING_DIMENSIONS", &mut provider.dimensions)?;
    env_parse("LUMEN_MAX_BATCH_SIZE", &mut provider.max_batch_size)?;
    env_parse("LUMEN_COST_PER_1K_TOKENS", &mut provider.cost_per_1k_tokens)?;
    env_parse("LUMEN_REQUEST_TIMEOUT_MS", &mut provider.request_timeout_ms)?;

    let breaker = &mut config.resilience.circuit_breaker;
    env_parse("LUMEN_MAX_FAILURES", &mut breaker.max_failures)?;
    env_parse("LUMEN_RESET_TIMEOUT_MS", &mut breaker.reset_timeout_ms)?;

    let backoff = &mut config.resilience.backoff;
    env_parse("LUMEN_BASE_DELAY_MS", &mut backoff.base_delay_ms)?;
    env_parse("LUMEN_BACKOFF_MULTIPLIER", &mut backoff.multiplier)?;
    env_parse("LUMEN_MAX_DELAY_MS", &mut backoff.max_delay_ms)?;
    env_parse("LUMEN_MAX_RETRIES", &mut backoff.max_retries)?;
    env_bool("LUMEN_JITTER", &mut backoff.jitter)?;

    let timeout = &mut config.resilience.timeout;
    env_parse("LUMEN_BASE_TIMEOUT_MS", &mut timeout.base_ms)?;
    env_parse("LUMEN_SIMPLE_TIMEOUT_MS", &mut timeout.simple_ms)?;
    env_parse("LUMEN_COMPLEX_TIMEOUT_MS", &mut timeout.complex_ms)?;
    env_bool("LUMEN_ADAPTIVE_TIMEOUT", &mut timeout.adaptive)?;

    if let Some(filter) = env_opt("LUMEN_LOG_FILTER") {
        config.logging.filter = filter;
    }
    if let Some(format) = env_opt("LUMEN_LOG_FORMAT") {
        config.logging.format = parse_log_format(&format)?;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `LumenError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<LumenConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(LumenError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => find_config_path().ok_or_else(|| {
            LumenError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| LumenError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration, picking the format from the file extension
fn parse_config(contents: &str, path: &Path) -> Result<LumenConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| LumenError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| LumenError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(LumenError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Search multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn find_config_path() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> [PathBuf; 8] {
    [
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("lumen.json"),
        dir.join("lumen.toml"),
        dir.join("../config.json"),
        dir.join("../config.toml"),
        dir.join("../../config.json"),
        dir.join("../../config.toml"),
    ]
}

/// Get required environment variable
///
/// # Errors
/// Returns `LumenError::Config` if the variable is unset or blank.
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        LumenError::Config(format!("Missing required environment variable: {key}"))
    })
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Overwrite `target` when `key` is set
///
/// # Errors
/// Returns `LumenError::Config` if the value does not parse.
fn env_parse<T>(key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = env_opt(key) {
        *target = raw
            .parse()
            .map_err(|e| LumenError::Config(format!("Invalid value for {key} ({raw}): {e}")))?;
    }
    Ok(())
}

/// Overwrite `target` with a boolean from the environment
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
///
/// # Errors
/// Returns `LumenError::Config` for any other value.
fn env_bool(key: &str, target: &mut bool) -> Result<()> {
    let Some(raw) = env_opt(key) else {
        return Ok(());
    };

    *target = match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            return Err(LumenError::Config(format!(
                "Invalid value for {key} ({raw}): expected a boolean"
            )))
        }
    };
    Ok(())
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "pretty" | "text" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(LumenError::Config(format!("Unsupported log format: {other}"))),
    }
}
