//! ID generation utilities for Taskmill
//!
//! Provides identifiers for task records, scheduler tasks, and correlation tokens.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Stable task record ID derived from its location
///
/// Format: `{file_path}-L{line}`
/// Example: `notes/todo.md-L12`
pub fn task_id(file_path: &str, line: usize) -> String {
    format!("{}-L{}", file_path, line)
}

/// Generate a scheduler task ID, unique within the process
///
/// Format: `ptask-{timestamp_ms}-{sequence}-{random_hex}`
pub fn generate_plugin_task_id() -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let timestamp = now_ms();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let random: u16 = rand::rng().random();
    format!("ptask-{}-{}-{:04x}", timestamp, sequence, random)
}

/// Generate a correlation ID for tracing a request end to end
///
/// Format: `corr-{timestamp_ms}-{random_hex}`
pub fn generate_correlation_id() -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("corr-{}-{:08x}", timestamp, random)
}
