//! Parse result types.
//!
//! A parse either succeeds with task data or fails with a coded error. Terminal
//! failures are always reported through `ParseResult::Error`, never by panicking
//! or propagating out of the scheduler.

use serde::{Deserialize, Serialize};

use crate::domain::plugin_type::PluginType;
use crate::domain::task::TaskRecord;
use crate::error::{ErrorCode, ParseError};

/// Timing and sizing information for a successful parse
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseStats {
    pub processing_time_ms: u64,
    pub cache_hit: bool,
    pub memory_estimate: usize,
}

/// Which plugin produced a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSource {
    pub plugin_type: PluginType,
    pub version: String,
    pub from_cache: bool,
}

/// Outcome of parsing one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParseResult {
    Success {
        data: Vec<TaskRecord>,
        stats: ParseStats,
        source: ResultSource,
    },
    Error {
        message: String,
        code: ErrorCode,
        recoverable: bool,
        details: Option<serde_json::Value>,
    },
}

impl ParseResult {
    /// Build a success result, computing the memory estimate from the data
    pub fn success(data: Vec<TaskRecord>, processing_time_ms: u64, source: ResultSource) -> Self {
        let memory_estimate = data.iter().map(TaskRecord::memory_estimate).sum();
        let cache_hit = source.from_cache;
        Self::Success {
            data,
            stats: ParseStats {
                processing_time_ms,
                cache_hit,
                memory_estimate,
            },
            source,
        }
    }

    /// Build an error result from a parse error
    pub fn from_error(err: &ParseError) -> Self {
        Self::Error {
            message: err.to_string(),
            code: err.code(),
            recoverable: err.is_recoverable(),
            details: None,
        }
    }

    /// Attach structured details to an error result; no-op on success
    pub fn with_details(mut self, value: serde_json::Value) -> Self {
        if let Self::Error { details, .. } = &mut self {
            *details = Some(value);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn tasks(&self) -> Option<&[TaskRecord]> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Error { .. } => None,
        }
    }

    pub fn into_tasks(self) -> Option<Vec<TaskRecord>> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Error { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Success { .. } => None,
            Self::Error { code, .. } => Some(*code),
        }
    }

    pub fn source(&self) -> Option<&ResultSource> {
        match self {
            Self::Success { source, .. } => Some(source),
            Self::Error { .. } => None,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        self.source().is_some_and(|s| s.from_cache)
    }
}
