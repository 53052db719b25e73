//! Retry policy with capped exponential backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How failed attempts are retried.
///
/// The delay before retry `n` (0-based) is
/// `min(base * multiplier^n + jitter, max_delay)` where jitter is drawn
/// uniformly from `[0, base)` when enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base_delay_ms = base.as_millis() as u64;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Deterministic delay for retry `attempt` with an explicit jitter value
    pub fn delay_for(&self, attempt: u32, jitter: Duration) -> Duration {
        let exp = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let base_ms = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        let delay = Duration::from_millis(base_ms as u64) + jitter;
        delay.min(Duration::from_millis(self.max_delay_ms))
    }

    /// Delay for retry `attempt`, drawing jitter when enabled
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter && self.base_delay_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..self.base_delay_ms))
        } else {
            Duration::ZERO
        };
        self.delay_for(attempt, jitter)
    }
}
