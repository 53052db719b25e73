//! Parse lifecycle events and the sinks that receive them.
//!
//! Delivery is fire-and-forget: a sink must never block the caller, so the
//! channel sink drops events when its buffer is full.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::plugin_type::PluginType;
use crate::id::now_ms;

/// Event type constants
pub mod event_types {
    pub const PARSE_STARTED: &str = "parse-started";
    pub const PARSE_COMPLETED: &str = "parse-completed";
    pub const PARSE_FAILED: &str = "parse-failed";
}

/// What happened to a parse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ParseEventKind {
    ParseStarted,
    ParseCompleted { task_count: usize },
    ParseFailed { error: String },
}

/// A lifecycle notification about one document parse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseEvent {
    pub file_path: String,
    pub plugin_type: PluginType,
    pub duration_ms: u64,
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub kind: ParseEventKind,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl ParseEvent {
    fn new(file_path: &str, plugin_type: PluginType, duration_ms: u64, kind: ParseEventKind) -> Self {
        Self {
            file_path: file_path.to_string(),
            plugin_type,
            duration_ms,
            correlation_id: None,
            kind,
            created_at: now_ms(),
        }
    }

    pub fn started(file_path: &str, plugin_type: PluginType) -> Self {
        Self::new(file_path, plugin_type, 0, ParseEventKind::ParseStarted)
    }

    pub fn completed(file_path: &str, plugin_type: PluginType, duration_ms: u64, task_count: usize) -> Self {
        Self::new(file_path, plugin_type, duration_ms, ParseEventKind::ParseCompleted { task_count })
    }

    pub fn failed(file_path: &str, plugin_type: PluginType, duration_ms: u64, error: &str) -> Self {
        Self::new(
            file_path,
            plugin_type,
            duration_ms,
            ParseEventKind::ParseFailed {
                error: error.to_string(),
            },
        )
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// The wire name of this event (`parse-started`, ...)
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            ParseEventKind::ParseStarted => event_types::PARSE_STARTED,
            ParseEventKind::ParseCompleted { .. } => event_types::PARSE_COMPLETED,
            ParseEventKind::ParseFailed { .. } => event_types::PARSE_FAILED,
        }
    }
}

/// Receiver of lifecycle notifications
pub trait EventSink: Send + Sync {
    /// Hand off an event; must return without waiting on the consumer
    fn emit(&self, event: ParseEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: ParseEvent) {}
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ParseEvent) {
        match &event.kind {
            ParseEventKind::ParseStarted => tracing::debug!(
                file_path = %event.file_path,
                plugin_type = %event.plugin_type,
                "parse-started"
            ),
            ParseEventKind::ParseCompleted { task_count } => tracing::info!(
                file_path = %event.file_path,
                plugin_type = %event.plugin_type,
                duration_ms = event.duration_ms,
                task_count = task_count,
                "parse-completed"
            ),
            ParseEventKind::ParseFailed { error } => tracing::warn!(
                file_path = %event.file_path,
                plugin_type = %event.plugin_type,
                duration_ms = event.duration_ms,
                error = %error,
                "parse-failed"
            ),
        }
    }
}

/// Pushes events into a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<ParseEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver that drains it
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ParseEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ParseEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::debug!(error = %e, "Dropping parse event");
        }
    }
}
