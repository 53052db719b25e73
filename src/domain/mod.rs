//! Domain types for Taskmill
//!
//! This module contains the core value types:
//! - TaskRecord: one extracted checkbox task with its metadata
//! - PluginType: which extraction strategy handles a document
//! - ParseResult: success-with-data or coded error
//! - ParseEvent: lifecycle notifications and their sinks

pub mod event;
pub mod plugin_type;
pub mod result;
pub mod task;

pub use event::{ChannelEventSink, EventSink, NoopEventSink, ParseEvent, ParseEventKind, TracingEventSink, event_types};
pub use plugin_type::PluginType;
pub use result::{ParseResult, ParseStats, ResultSource};
pub use task::{ALLOWED_STATUS_CHARS, OnCompletion, TaskMetadata, TaskRecord, is_allowed_status, is_completion_marker};
