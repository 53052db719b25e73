//! Parser plugins and the execution contract that wraps them.
//!
//! A plugin only knows how to turn a `ParseContext` into tasks. Everything
//! around that call (validation, cache-first lookup, per-attempt timeout,
//! retry with backoff, fallback) lives in `PluginExecutor` so every plugin
//! behaves the same under failure.

mod canvas;
mod executor;
mod markdown;
mod retry;
mod stats;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ParseContext;
use crate::domain::{PluginType, TaskRecord};
use crate::error::ParseError;

pub use canvas::CanvasPlugin;
pub use executor::{ExecutionReport, ExecutorOptions, PluginExecutor, PluginRunner};
pub use markdown::MarkdownPlugin;
pub use retry::RetryPolicy;
pub use stats::{HEALTHY_SUCCESS_RATE, LATENCY_CEILING, LATENCY_WINDOW, PluginStats, StatsSnapshot};

/// An extraction strategy for one kind of document
#[async_trait]
pub trait ParserPlugin: Send + Sync {
    fn plugin_type(&self) -> PluginType;

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    /// Produce tasks for the document. Called once per attempt.
    async fn parse_internal(&self, ctx: &ParseContext) -> Result<Vec<TaskRecord>, ParseError>;

    /// Tasks returned by the `DefaultValues` fallback
    fn fallback_result(&self, _ctx: &ParseContext) -> Vec<TaskRecord> {
        Vec::new()
    }

    /// Whether a failed attempt is worth retrying
    fn is_recoverable(&self, err: &ParseError) -> bool {
        err.is_recoverable()
    }
}

/// What to do once retries are exhausted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategy {
    /// Report the last error
    #[default]
    None,
    /// Serve the most recent cached generation of the document
    Cache,
    /// Succeed with the plugin's `fallback_result`
    DefaultValues,
    /// Run a configured alternate plugin once
    AlternateParser,
    /// Give up without retrying and report the document as skipped
    Skip,
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Cache => "cache",
            Self::DefaultValues => "default-values",
            Self::AlternateParser => "alternate-parser",
            Self::Skip => "skip",
        };
        f.write_str(s)
    }
}

impl FromStr for FallbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => Ok(Self::None),
            "cache" => Ok(Self::Cache),
            "default-values" | "defaults" => Ok(Self::DefaultValues),
            "alternate-parser" | "alternate" => Ok(Self::AlternateParser),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("unknown fallback strategy: {}", s)),
        }
    }
}
