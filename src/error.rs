//! Error types for Taskmill
//!
//! Centralized error handling using thiserror. `TaskmillError` covers contract
//! violations and I/O at the crate boundary; `ParseError` is the taxonomy that
//! flows through plugin execution and ends up inside a `ParseResult::Error`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the crate's public handles
#[derive(Debug, Error)]
pub enum TaskmillError {
    /// Plugin type has no registration
    #[error("Plugin not registered: {0}")]
    PluginNotRegistered(String),

    /// The manager loop is gone (shut down or panicked)
    #[error("Manager unavailable: {0}")]
    ManagerUnavailable(String),

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Context serialization version mismatch
    #[error("Unsupported serialization version: {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Taskmill operations
pub type Result<T> = std::result::Result<T, TaskmillError>;

/// Machine-readable error code carried by `ParseResult::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    Extraction,
    Timeout,
    QueueFull,
    CircuitOpen,
    DeadlineExceeded,
    Cancelled,
    Skipped,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Extraction => "EXTRACTION",
            Self::Timeout => "TIMEOUT",
            Self::QueueFull => "QUEUE_FULL",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Cancelled => "CANCELLED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single parse attempt
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// Malformed context (missing path or content)
    #[error("Invalid parse context: {0}")]
    Validation(String),

    /// Raised inside a plugin's `parse_internal`
    #[error("Extraction failed: {message}")]
    Extraction { message: String, recoverable: bool },

    /// Attempt exceeded the plugin timeout
    #[error("Parse timed out after {0:?}")]
    Timeout(Duration),

    /// Scheduler queue is at capacity
    #[error("Task queue is full ({0} queued)")]
    QueueFull(usize),

    /// Target plugin's circuit breaker is open
    #[error("Circuit breaker is open for {0}")]
    CircuitOpen(String),

    /// Task deadline passed while it was queued
    #[error("Deadline exceeded for task {0}")]
    DeadlineExceeded(String),

    /// Task was cancelled before it produced a result
    #[error("Task cancelled: {0}")]
    Cancelled(String),

    /// Skip fallback strategy gave up on the document
    #[error("Parse skipped: {0}")]
    Skipped(String),
}

impl ParseError {
    /// Convenience constructor for a recoverable extraction failure
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            recoverable: true,
        }
    }

    /// Convenience constructor for an extraction failure that must not be retried
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            recoverable: false,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Extraction { .. } => ErrorCode::Extraction,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::QueueFull(_) => ErrorCode::QueueFull,
            Self::CircuitOpen(_) => ErrorCode::CircuitOpen,
            Self::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,
            Self::Cancelled(_) => ErrorCode::Cancelled,
            Self::Skipped(_) => ErrorCode::Skipped,
        }
    }

    /// Whether retrying the same call could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Extraction { recoverable, .. } => *recoverable,
            Self::Timeout(_) => true,
            Self::QueueFull(_) => true,
            Self::Skipped(_) => true,
            Self::Validation(_) => false,
            Self::CircuitOpen(_) => false,
            Self::DeadlineExceeded(_) => false,
            Self::Cancelled(_) => false,
        }
    }
}
