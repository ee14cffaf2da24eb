//! Health check for the configured LLM provider
//!
//! Sends one embedding request through the full resilience stack and prints
//! the [`HealthReport`](lumen_infra::HealthReport) as JSON. Exits non-zero
//! when the provider is unhealthy.
//!
//! ```text
//! lumen-health [CONFIG_PATH]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use lumen_common::resilience::CallContext;
use lumen_infra::{config, init_tracing, ResilientClient};

const CHECK_DEADLINE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("lumen-health: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => config::load_from_file(Some(path)),
        None => config::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config.logging);

    let client = ResilientClient::new(&config).context("failed to build client")?;
    let report = client.health_check(&CallContext::new().with_timeout(CHECK_DEADLINE)).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.is_healthy())
}
