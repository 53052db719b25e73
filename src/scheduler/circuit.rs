//! Per-plugin circuit breaker.
//!
//! State changes go through one pure function, `transition`, so the whole
//! state machine can be read (and tested) in one place. `CircuitBreaker`
//! keeps the counters that feed it. It is owned by the manager loop and takes
//! explicit instants, so it needs no locking and no clock of its own.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::domain::PluginType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected until the recovery timeout elapses
    Open,
    /// Probing: successes close the circuit, any failure reopens it
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CircuitBreakerConfig {
    /// Failures inside the window that open the circuit
    pub failure_threshold: usize,
    pub time_window_ms: u64,
    /// How long an open circuit waits before probing
    pub recovery_timeout_ms: u64,
    /// Consecutive half-open successes that close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            time_window_ms: 30_000,
            recovery_timeout_ms: 30_000,
            success_threshold: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn with_failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitEvent {
    /// A call succeeded; carries the half-open success count including this one
    Success { half_open_successes: u32 },
    /// A call failed; carries the failures inside the window including this one
    Failure { recent_failures: usize },
    /// The recovery timeout has passed since the circuit opened
    RecoveryElapsed,
}

/// The circuit breaker state machine
pub fn transition(state: CircuitState, event: CircuitEvent, config: &CircuitBreakerConfig) -> CircuitState {
    use CircuitEvent::*;
    use CircuitState::*;

    match (state, event) {
        (Closed, Failure { recent_failures }) if recent_failures >= config.failure_threshold => Open,
        (Open, RecoveryElapsed) => HalfOpen,
        (HalfOpen, Success { half_open_successes }) if half_open_successes >= config.success_threshold => Closed,
        (HalfOpen, Failure { .. }) => Open,
        (state, _) => state,
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    plugin_type: PluginType,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: VecDeque<Instant>,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
}

impl CircuitBreaker {
    pub fn new(plugin_type: PluginType, config: CircuitBreakerConfig) -> Self {
        Self {
            plugin_type,
            config,
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            last_failure: None,
            opened_at: None,
            half_open_successes: 0,
        }
    }

    /// State as of the last update, without checking the recovery timeout
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// State at `now`, moving Open to HalfOpen once the recovery timeout has passed
    pub fn poll(&mut self, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open
            && let Some(opened_at) = self.opened_at
            && now.saturating_duration_since(opened_at) >= self.config.recovery_timeout()
        {
            self.apply(CircuitEvent::RecoveryElapsed, now);
        }
        self.state
    }

    pub fn is_open(&mut self, now: Instant) -> bool {
        self.poll(now) == CircuitState::Open
    }

    pub fn record_success(&mut self, now: Instant) {
        if self.poll(now) == CircuitState::HalfOpen {
            self.half_open_successes += 1;
        }
        let event = CircuitEvent::Success {
            half_open_successes: self.half_open_successes,
        };
        self.apply(event, now);
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.poll(now);
        self.last_failure = Some(now);
        self.failures.push_back(now);
        let window = self.config.time_window();
        while self
            .failures
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) > window)
        {
            self.failures.pop_front();
        }
        let event = CircuitEvent::Failure {
            recent_failures: self.failures.len(),
        };
        self.apply(event, now);
    }

    /// Failures currently inside the window
    pub fn recent_failures(&self) -> usize {
        self.failures.len()
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    fn apply(&mut self, event: CircuitEvent, now: Instant) {
        let next = transition(self.state, event, &self.config);
        if next == self.state {
            return;
        }
        match next {
            CircuitState::Open => {
                error!(
                    plugin_type = %self.plugin_type,
                    recent_failures = self.failures.len(),
                    recovery_ms = self.config.recovery_timeout_ms,
                    "Circuit opened"
                );
                self.opened_at = Some(now);
                self.half_open_successes = 0;
            }
            CircuitState::HalfOpen => {
                info!(plugin_type = %self.plugin_type, "Circuit half-open, probing recovery");
                self.half_open_successes = 0;
            }
            CircuitState::Closed => {
                info!(plugin_type = %self.plugin_type, "Circuit closed");
                self.failures.clear();
                self.opened_at = None;
                self.half_open_successes = 0;
            }
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_transition_table() {
        let c = config();
        use CircuitEvent::*;
        use CircuitState::*;
        assert_eq!(transition(Closed, Failure { recent_failures: 4 }, &c), Closed);
        assert_eq!(transition(Closed, Failure { recent_failures: 5 }, &c), Open);
        assert_eq!(transition(Closed, RecoveryElapsed, &c), Closed);
        assert_eq!(transition(Open, Success { half_open_successes: 9 }, &c), Open);
        assert_eq!(transition(Open, RecoveryElapsed, &c), HalfOpen);
        assert_eq!(transition(HalfOpen, Success { half_open_successes: 2 }, &c), HalfOpen);
        assert_eq!(transition(HalfOpen, Success { half_open_successes: 3 }, &c), Closed);
        assert_eq!(transition(HalfOpen, Failure { recent_failures: 1 }, &c), Open);
    }

    #[test]
    fn test_full_sequence() {
        let mut cb = CircuitBreaker::new(PluginType::Markdown, config());
        let t0 = Instant::now();

        for i in 0..4 {
            cb.record_failure(t0 + secs(i));
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure(t0 + secs(4));
        assert_eq!(cb.state(), CircuitState::Open);

        // Still open just before the recovery timeout
        assert!(cb.is_open(t0 + secs(33)));
        assert_eq!(cb.poll(t0 + secs(34)), CircuitState::HalfOpen);

        cb.record_success(t0 + secs(35));
        cb.record_success(t0 + secs(36));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success(t0 + secs(37));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.recent_failures(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut cb = CircuitBreaker::new(PluginType::Canvas, config().with_failure_threshold(1));
        let t0 = Instant::now();
        cb.record_failure(t0);
        assert_eq!(cb.poll(t0 + secs(30)), CircuitState::HalfOpen);
        cb.record_success(t0 + secs(31));
        cb.record_failure(t0 + secs(32));
        assert_eq!(cb.state(), CircuitState::Open);
        // The recovery timer restarts from the reopen
        assert!(cb.is_open(t0 + secs(61)));
        assert!(!cb.is_open(t0 + secs(62)));
    }

    #[test]
    fn test_failures_outside_window_do_not_open() {
        let mut cb = CircuitBreaker::new(PluginType::Markdown, config());
        let t0 = Instant::now();
        for i in 0..10 {
            cb.record_failure(t0 + secs(i * 10));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.recent_failures() <= 4);
        assert_eq!(cb.last_failure(), Some(t0 + secs(90)));
    }

    #[test]
    fn test_success_while_closed_keeps_closed() {
        let mut cb = CircuitBreaker::new(PluginType::Markdown, config());
        let t0 = Instant::now();
        cb.record_success(t0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
