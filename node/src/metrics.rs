use std::{collections::HashMap, time::Duration};

use parking_lot::Mutex;

/// Running mean of observed round-trip durations.
///
/// Process-lifetime state only: reset happens at restart, never in between.
#[derive(Debug, Default, Clone)]
pub struct LatencyStats {
    total: Duration,
    count: u64,
}

impl LatencyStats {
    /// Folds one observed round trip into the running mean.
    pub fn record(&mut self, rtt: Duration) {
        self.total += rtt;
        self.count += 1;
    }

    /// The running mean, or `None` before the first observation.
    pub fn mean(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        Some(self.total / self.count as u32)
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Per downstream role latency accumulators, shared across forward tasks.
#[derive(Default)]
pub struct RoleLatency {
    stats: Mutex<HashMap<String, LatencyStats>>,
}

impl RoleLatency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one round trip against `role` and returns the new mean.
    pub fn record(&self, role: &str, rtt: Duration) -> Duration {
        let mut stats = self.stats.lock();
        let entry = stats.entry(role.to_string()).or_default();
        entry.record(rtt);

        // Just recorded, so a mean exists.
        entry.mean().unwrap_or_default()
    }

    pub fn snapshot(&self, role: &str) -> Option<LatencyStats> {
        self.stats.lock().get(role).cloned()
    }
}
