//! Health check report

use std::time::Duration;

use chrono::{DateTime, Utc};
use lumen_common::resilience::CircuitBreakerStats;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Outcome of one health-check call through the full resilience stack
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(rename = "latency_ms", serialize_with = "lumen_common::duration_millis::serialize")]
    pub latency: Duration,
    pub breaker: CircuitBreakerStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
