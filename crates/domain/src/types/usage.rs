//! Token usage and cost accounting

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Estimated cost of `tokens` at `cost_per_1k_tokens`
pub fn estimate_cost(tokens: u64, cost_per_1k_tokens: f64) -> f64 {
    tokens as f64 / 1000.0 * cost_per_1k_tokens
}

/// Usage of one logical call, finalized once the call returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub call_id: Uuid,
    pub tokens_used: u64,
    /// Provider requests made; batched embeddings make more than one
    pub request_count: u32,
    pub estimated_cost: f64,
    #[serde(rename = "processing_time_ms", with = "millis")]
    pub processing_time: Duration,
}

impl UsageRecord {
    /// Record for a call that never reached the provider
    pub fn empty(call_id: Uuid) -> Self {
        Self {
            call_id,
            tokens_used: 0,
            request_count: 0,
            estimated_cost: 0.0,
            processing_time: Duration::ZERO,
        }
    }
}

/// Collects per-request usage while a logical call is in progress
#[derive(Debug, Clone)]
pub struct UsageAccumulator {
    call_id: Uuid,
    tokens_used: u64,
    request_count: u32,
}

impl UsageAccumulator {
    pub fn new(call_id: Uuid) -> Self {
        Self { call_id, tokens_used: 0, request_count: 0 }
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Account for one successful provider request
    pub fn add_request(&mut self, tokens: u64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
        self.request_count = self.request_count.saturating_add(1);
    }

    pub fn finish(self, processing_time: Duration, cost_per_1k_tokens: f64) -> UsageRecord {
        UsageRecord {
            call_id: self.call_id,
            tokens_used: self.tokens_used,
            request_count: self.request_count,
            estimated_cost: estimate_cost(self.tokens_used, cost_per_1k_tokens),
            processing_time,
        }
    }
}

/// Process-lifetime usage totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Logical calls that completed successfully
    pub calls: u64,
    /// Logical calls that ended in an error
    pub failures: u64,
    pub requests: u64,
    pub tokens_used: u64,
    pub estimated_cost: f64,
}

impl UsageTotals {
    pub fn record(&mut self, usage: &UsageRecord) {
        self.calls += 1;
        self.requests += u64::from(usage.request_count);
        self.tokens_used = self.tokens_used.saturating_add(usage.tokens_used);
        self.estimated_cost += usage.estimated_cost;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_tokens_over_thousand_times_rate() {
        assert!((estimate_cost(1_500, 0.02) - 0.03).abs() < f64::EPSILON);
        assert_eq!(estimate_cost(0, 0.02), 0.0);
    }

    #[test]
    fn accumulator_sums_requests() {
        let call_id = Uuid::now_v7();
        let mut acc = UsageAccumulator::new(call_id);
        acc.add_request(400);
        acc.add_request(600);

        let usage = acc.finish(Duration::from_millis(250), 0.1);

        assert_eq!(usage.call_id, call_id);
        assert_eq!(usage.tokens_used, 1_000);
        assert_eq!(usage.request_count, 2);
        assert!((usage.estimated_cost - 0.1).abs() < 1e-12);
        assert_eq!(usage.processing_time, Duration::from_millis(250));
    }

    #[test]
    fn processing_time_serializes_as_millis() {
        let mut usage = UsageRecord::empty(Uuid::nil());
        usage.processing_time = Duration::from_millis(1_234);

        let json = serde_json::to_value(&usage).expect("serializes");
        assert_eq!(json["processing_time_ms"], 1_234);

        let back: UsageRecord = serde_json::from_value(json).expect("deserializes");
        assert_eq!(back, usage);
    }

    #[test]
    fn totals_track_calls_and_failures() {
        let mut totals = UsageTotals::default();
        let mut acc = UsageAccumulator::new(Uuid::nil());
        acc.add_request(10);
        totals.record(&acc.finish(Duration::ZERO, 1.0));
        totals.record_failure();

        assert_eq!(totals.calls, 1);
        assert_eq!(totals.failures, 1);
        assert_eq!(totals.requests, 1);
        assert_eq!(totals.tokens_used, 10);
    }
}
