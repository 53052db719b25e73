//! Load-balancing score for picking the next queued task.
//!
//! Each component is normalized to [0, 1] and combined with configurable
//! weights. Higher scores run first.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ParsePriority;
use crate::plugin::LATENCY_CEILING;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScoreWeights {
    pub priority: f64,
    pub load: f64,
    pub latency: f64,
    pub health: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            priority: 0.4,
            load: 0.3,
            latency: 0.2,
            health: 0.1,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.priority + self.load + self.latency + self.health
    }
}

/// What the scorer needs to know about a plugin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PluginLoad {
    pub active: usize,
    pub max_concurrency: usize,
    pub average_latency: Duration,
    pub healthy: bool,
}

pub fn priority_score(priority: ParsePriority) -> f64 {
    1.0 - priority.rank() as f64 / 2.0
}

pub fn load_score(active: usize, max_concurrency: usize) -> f64 {
    if max_concurrency == 0 {
        return 0.0;
    }
    (1.0 - active as f64 / max_concurrency as f64).max(0.0)
}

pub fn latency_score(average: Duration) -> f64 {
    (1.0 - average.as_secs_f64() / LATENCY_CEILING.as_secs_f64()).max(0.0)
}

pub fn score(priority: ParsePriority, load: &PluginLoad, weights: &ScoreWeights) -> f64 {
    weights.priority * priority_score(priority)
        + weights.load * load_score(load.active, load.max_concurrency)
        + weights.latency * latency_score(load.average_latency)
        + weights.health * if load.healthy { 1.0 } else { 0.0 }
}

/// Index of the highest score; ties keep the earliest candidate
pub fn pick_best(candidates: impl IntoIterator<Item = (usize, f64)>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, score) in candidates {
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}
