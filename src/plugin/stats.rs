//! Rolling health statistics for a plugin.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

/// Latency samples kept for the rolling average
pub const LATENCY_WINDOW: usize = 100;

/// Average latency at or above which a plugin is unhealthy
pub const LATENCY_CEILING: Duration = Duration::from_secs(5);

/// Success rate a plugin must exceed to count as healthy
pub const HEALTHY_SUCCESS_RATE: f64 = 0.8;

/// Call counters and latency window for one plugin type
#[derive(Debug, Clone, Default)]
pub struct PluginStats {
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    latencies: VecDeque<Duration>,
}

impl PluginStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, latency: Duration, cache_hit: bool) {
        self.successes += 1;
        if cache_hit {
            self.cache_hits += 1;
        }
        self.push_latency(latency);
    }

    pub fn record_failure(&mut self, latency: Duration) {
        self.failures += 1;
        self.push_latency(latency);
    }

    fn push_latency(&mut self, latency: Duration) {
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Fraction of calls that succeeded; 1.0 before any call
    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 1.0,
            total => self.successes as f64 / total as f64,
        }
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        match self.successes {
            0 => 0.0,
            n => self.cache_hits as f64 / n as f64,
        }
    }

    pub fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        self.latencies.iter().sum::<Duration>() / self.latencies.len() as u32
    }

    pub fn max_latency(&self) -> Duration {
        self.latencies.iter().copied().max().unwrap_or_default()
    }

    /// Healthy iff success rate > 0.8 and average latency under the ceiling.
    /// A plugin with no history is healthy.
    pub fn is_healthy(&self) -> bool {
        self.total() == 0
            || (self.success_rate() > HEALTHY_SUCCESS_RATE && self.average_latency() < LATENCY_CEILING)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            successes: self.successes,
            failures: self.failures,
            success_rate: self.success_rate(),
            cache_hit_ratio: self.cache_hit_ratio(),
            average_latency_ms: self.average_latency().as_millis() as u64,
            max_latency_ms: self.max_latency().as_millis() as u64,
            healthy: self.is_healthy(),
        }
    }
}

/// Point-in-time copy of `PluginStats` for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub cache_hit_ratio: f64,
    pub average_latency_ms: u64,
    pub max_latency_ms: u64,
    pub healthy: bool,
}
