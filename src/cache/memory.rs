//! In-process cache store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::{CacheStore, SetOptions};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    dependencies: Vec<String>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// HashMap-backed `CacheStore` for tests, the CLI, and embedding
#[derive(Debug, Default)]
pub struct MemoryCache {
    namespaces: Mutex<HashMap<String, HashMap<String, Entry>>>,
    default_ttl: Option<Duration>,
}

impl MemoryCache {
    /// Create a cache whose entries never expire unless a TTL is given per set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache applying `ttl` to entries set without one
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            namespaces: Mutex::new(HashMap::new()),
            default_ttl: Some(ttl),
        }
    }

    /// Number of live entries in a namespace
    pub fn len(&self, namespace: &str) -> usize {
        let now = Instant::now();
        self.lock()
            .get(namespace)
            .map(|ns| ns.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    /// Remove everything
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, Entry>>> {
        self.namespaces.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove_where<F>(&self, namespace: &str, pred: F) -> usize
    where
        F: Fn(&str, &Entry) -> bool,
    {
        let mut guard = self.lock();
        let Some(ns) = guard.get_mut(namespace) else {
            return 0;
        };
        let before = ns.len();
        ns.retain(|key, entry| !pred(key, entry));
        before - ns.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut guard = self.lock();
        let ns = guard.get_mut(namespace)?;
        if ns.get(key)?.is_expired(now) {
            ns.remove(key);
            return None;
        }
        ns.get(key).map(|entry| entry.value.clone())
    }

    async fn set(&self, namespace: &str, key: &str, value: Value, options: SetOptions) {
        let now = Instant::now();
        let ttl = options.ttl.or(self.default_ttl);
        let entry = Entry {
            value,
            expires_at: ttl.map(|t| now + t),
            dependencies: options.dependencies,
        };
        let mut guard = self.lock();
        let ns = guard.entry(namespace.to_string()).or_default();
        // Expired entries are otherwise only dropped when their own key is read
        ns.retain(|_, e| !e.is_expired(now));
        ns.insert(key.to_string(), entry);
    }

    async fn invalidate_by_path(&self, path: &str, namespace: &str) -> usize {
        let removed = self.remove_where(namespace, |_, entry| entry.dependencies.iter().any(|d| d == path));
        if removed > 0 {
            tracing::debug!(namespace = %namespace, path = %path, removed, "Invalidated cache entries by path");
        }
        removed
    }

    async fn invalidate_by_pattern(&self, prefix: &str, namespace: &str) -> usize {
        self.remove_where(namespace, |key, _| key.starts_with(prefix))
    }
}
