//! Cache contract consumed by plugins and the scheduler.
//!
//! The store is namespaced key/value with time-to-live and dependency-tagged
//! invalidation. TTL and dependency invalidation are authoritative: a hit is
//! trusted as fresh, and freshness is otherwise only encoded by the
//! modification time baked into the key.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::PluginType;

pub use memory::MemoryCache;

/// Options for `CacheStore::set`
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Entry lifetime; `None` uses the store default
    pub ttl: Option<Duration>,
    /// Paths whose invalidation also drops this entry
    pub dependencies: Vec<String>,
}

impl SetOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn depends_on(mut self, path: impl Into<String>) -> Self {
        self.dependencies.push(path.into());
        self
    }
}

/// Namespaced key/value store with TTL and dependency invalidation
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry
    async fn get(&self, namespace: &str, key: &str) -> Option<Value>;

    /// Insert or replace an entry
    async fn set(&self, namespace: &str, key: &str, value: Value, options: SetOptions);

    /// Drop every entry in `namespace` that depends on `path`. Returns the count removed.
    async fn invalidate_by_path(&self, path: &str, namespace: &str) -> usize;

    /// Drop every entry in `namespace` whose key starts with `prefix`. Returns the count removed.
    async fn invalidate_by_pattern(&self, prefix: &str, namespace: &str) -> usize;
}

/// Namespace holding a plugin's parse results
pub fn parse_namespace(plugin_type: PluginType) -> String {
    format!("parser:{}", plugin_type)
}

/// Key for one generation of a document: `(file_path, mod_time)`
pub fn parse_key(file_path: &str, mod_time: i64) -> String {
    format!("{}:{}", file_path, mod_time)
}

/// Key for the most recent successful generation of a document, whatever its mod time
pub fn latest_key(file_path: &str) -> String {
    format!("{}:latest", file_path)
}
