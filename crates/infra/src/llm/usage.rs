//! Process-lifetime usage accounting

use lumen_domain::{UsageRecord, UsageTotals};
use parking_lot::Mutex;

/// Accumulates [`UsageTotals`] across concurrent calls
#[derive(Debug, Default)]
pub struct UsageTracker {
    totals: Mutex<UsageTotals>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: &UsageRecord) {
        self.totals.lock().record(usage);
    }

    pub fn record_failure(&self) {
        self.totals.lock().record_failure();
    }

    /// Snapshot of the totals so far
    pub fn totals(&self) -> UsageTotals {
        self.totals.lock().clone()
    }
}
