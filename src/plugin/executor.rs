//! The shared execution contract around a parser plugin.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{FallbackStrategy, ParserPlugin, PluginStats, RetryPolicy};
use crate::cache::{SetOptions, latest_key, parse_key, parse_namespace};
use crate::context::ParseContext;
use crate::domain::{ParseResult, PluginType, ResultSource, TaskRecord};
use crate::error::ParseError;

/// Per-plugin execution tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutorOptions {
    /// Bound on a single attempt
    #[serde(with = "duration_ms", rename = "timeout-ms")]
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub fallback: FallbackStrategy,
    /// Lifetime of cached results; `None` uses the store default
    #[serde(with = "option_duration_ms", rename = "cache-ttl-ms")]
    pub cache_ttl: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            fallback: FallbackStrategy::None,
            cache_ttl: None,
        }
    }
}

impl ExecutorOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

/// What happened during one `execute` call
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub result: ParseResult,
    /// Calls made to the primary plugin; 0 for cache hits and rejected contexts
    pub attempts: u32,
    pub elapsed: Duration,
    pub cache_hit: bool,
}

impl ExecutionReport {
    /// Fold this outcome into health statistics. Rejected contexts never
    /// reached the plugin and are not counted.
    pub fn record_into(&self, stats: &mut PluginStats) {
        if self.result.is_success() {
            stats.record_success(self.elapsed, self.cache_hit);
        } else if self.attempts > 0 {
            stats.record_failure(self.elapsed);
        }
    }
}

/// Wraps a plugin with validation, cache-first lookup, timeout, retry and fallback
#[derive(Clone)]
pub struct PluginExecutor {
    plugin: Arc<dyn ParserPlugin>,
    alternate: Option<Arc<dyn ParserPlugin>>,
    options: ExecutorOptions,
}

impl PluginExecutor {
    pub fn new(plugin: Arc<dyn ParserPlugin>) -> Self {
        Self {
            plugin,
            alternate: None,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Plugin used by the `AlternateParser` fallback
    pub fn with_alternate(mut self, alternate: Arc<dyn ParserPlugin>) -> Self {
        self.alternate = Some(alternate);
        self
    }

    pub fn plugin_type(&self) -> PluginType {
        self.plugin.plugin_type()
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run the plugin over `ctx`. Never fails: terminal errors come back as
    /// `ParseResult::Error`.
    pub async fn execute(&self, ctx: &ParseContext) -> ExecutionReport {
        let start = Instant::now();
        let plugin_type = self.plugin.plugin_type();

        if let Err(err) = ctx.validate() {
            debug!(plugin_type = %plugin_type, error = %err, "Rejected parse context");
            return report(ParseResult::from_error(&err), 0, start);
        }

        if let Some(tasks) = self.cached(ctx, &parse_key(&ctx.file_path, ctx.mod_time)).await {
            debug!(plugin_type = %plugin_type, path = %ctx.file_path, "Cache hit");
            let result = ParseResult::success(tasks, elapsed_ms(start), source(self.plugin.as_ref(), true));
            return report(result, 0, start);
        }

        let mut attempts = 0u32;
        let last_error = loop {
            attempts += 1;
            let err = match self.attempt(self.plugin.as_ref(), ctx).await {
                Ok(tasks) => {
                    self.store(ctx, &tasks).await;
                    let result = ParseResult::success(tasks, elapsed_ms(start), source(self.plugin.as_ref(), false));
                    return report(result, attempts, start);
                }
                Err(err) => err,
            };

            let retries_used = attempts - 1;
            if self.options.fallback == FallbackStrategy::Skip
                || !self.plugin.is_recoverable(&err)
                || retries_used >= self.options.retry.max_retries
            {
                break err;
            }

            let delay = self.options.retry.next_delay(retries_used);
            warn!(
                plugin_type = %plugin_type,
                path = %ctx.file_path,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Parse attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        };

        let result = self.fallback(ctx, last_error, start).await;
        report(result, attempts, start)
    }

    async fn attempt(&self, plugin: &dyn ParserPlugin, ctx: &ParseContext) -> Result<Vec<TaskRecord>, ParseError> {
        match tokio::time::timeout(self.options.timeout, plugin.parse_internal(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ParseError::Timeout(self.options.timeout)),
        }
    }

    async fn fallback(&self, ctx: &ParseContext, err: ParseError, start: Instant) -> ParseResult {
        let plugin_type = self.plugin.plugin_type();
        let strategy = self.options.fallback;
        if strategy != FallbackStrategy::None {
            warn!(plugin_type = %plugin_type, path = %ctx.file_path, strategy = %strategy, error = %err, "Applying fallback");
        }

        match strategy {
            FallbackStrategy::None => ParseResult::from_error(&err),
            FallbackStrategy::Cache => match self.cached(ctx, &latest_key(&ctx.file_path)).await {
                Some(tasks) => ParseResult::success(tasks, elapsed_ms(start), source(self.plugin.as_ref(), true)),
                None => ParseResult::from_error(&err),
            },
            FallbackStrategy::DefaultValues => ParseResult::success(
                self.plugin.fallback_result(ctx),
                elapsed_ms(start),
                source(self.plugin.as_ref(), false),
            ),
            FallbackStrategy::AlternateParser => {
                let Some(alternate) = &self.alternate else {
                    return ParseResult::from_error(&err);
                };
                match self.attempt(alternate.as_ref(), ctx).await {
                    Ok(tasks) => ParseResult::success(tasks, elapsed_ms(start), source(alternate.as_ref(), false)),
                    Err(alt_err) => ParseResult::from_error(&err).with_details(json!({
                        "alternate": alternate.plugin_type(),
                        "alternateError": alt_err.to_string(),
                    })),
                }
            }
            FallbackStrategy::Skip => ParseResult::from_error(&ParseError::Skipped(ctx.file_path.clone()))
                .with_details(json!({ "cause": err.to_string() })),
        }
    }

    async fn cached(&self, ctx: &ParseContext, key: &str) -> Option<Vec<TaskRecord>> {
        let cache = ctx.cache.as_ref()?;
        let value = cache.get(&parse_namespace(self.plugin.plugin_type()), key).await?;
        match serde_json::from_value(value) {
            Ok(tasks) => Some(tasks),
            Err(e) => {
                warn!(path = %ctx.file_path, key = %key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    /// Cache a fresh generation under its mod-time key and as the latest generation.
    /// Older generations of the document are dropped first.
    async fn store(&self, ctx: &ParseContext, tasks: &[TaskRecord]) {
        let Some(cache) = ctx.cache.as_ref() else { return };
        let value = match serde_json::to_value(tasks) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %ctx.file_path, error = %e, "Could not serialize tasks for cache");
                return;
            }
        };

        let namespace = parse_namespace(self.plugin.plugin_type());
        let mut options = SetOptions::default().depends_on(ctx.file_path.clone());
        if let Some(ttl) = self.options.cache_ttl {
            options = options.with_ttl(ttl);
        }
        let superseded = cache.invalidate_by_pattern(&format!("{}:", ctx.file_path), &namespace).await;
        if superseded > 0 {
            debug!(path = %ctx.file_path, superseded, "Dropped older cached generations");
        }
        cache
            .set(&namespace, &parse_key(&ctx.file_path, ctx.mod_time), value.clone(), options.clone())
            .await;
        cache.set(&namespace, &latest_key(&ctx.file_path), value, options).await;
    }
}

fn source(plugin: &dyn ParserPlugin, from_cache: bool) -> ResultSource {
    ResultSource {
        plugin_type: plugin.plugin_type(),
        version: plugin.version().to_string(),
        from_cache,
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn report(result: ParseResult, attempts: u32, start: Instant) -> ExecutionReport {
    ExecutionReport {
        cache_hit: result.is_from_cache(),
        result,
        attempts,
        elapsed: start.elapsed(),
    }
}

/// An executor paired with its own health statistics, for use outside the scheduler
pub struct PluginRunner {
    executor: PluginExecutor,
    stats: Mutex<PluginStats>,
}

impl PluginRunner {
    pub fn new(executor: PluginExecutor) -> Self {
        Self {
            executor,
            stats: Mutex::new(PluginStats::new()),
        }
    }

    pub async fn parse(&self, ctx: &ParseContext) -> ParseResult {
        let report = self.executor.execute(ctx).await;
        report.record_into(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
        report.result
    }

    pub fn stats(&self) -> PluginStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCache};
    use crate::error::ErrorCode;
    use crate::plugin::MarkdownPlugin;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `fail_times` calls with the given error, then succeeds
    struct FlakyPlugin {
        calls: AtomicU32,
        fail_times: u32,
        error: ParseError,
        delay: Duration,
    }

    impl FlakyPlugin {
        fn new(fail_times: u32, error: ParseError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_times,
                error,
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(0, ParseError::extraction("unused"))
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ParserPlugin for FlakyPlugin {
        fn plugin_type(&self) -> PluginType {
            PluginType::Markdown
        }

        async fn parse_internal(&self, ctx: &ParseContext) -> Result<Vec<TaskRecord>, ParseError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if n < self.fail_times {
                return Err(self.error.clone());
            }
            Ok(vec![TaskRecord::new(
                format!("{}-L0", ctx.file_path),
                ' ',
                format!("call {}", n),
                "- [ ] t".into(),
                0,
            )])
        }

        fn fallback_result(&self, ctx: &ParseContext) -> Vec<TaskRecord> {
            vec![TaskRecord::new(format!("{}-default", ctx.file_path), ' ', "default".into(), String::new(), 0)]
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_base_delay(Duration::from_millis(1))
            .without_jitter()
    }

    fn executor(plugin: Arc<FlakyPlugin>, fallback: FallbackStrategy) -> PluginExecutor {
        PluginExecutor::new(plugin).with_options(
            ExecutorOptions::default()
                .with_retry(fast_retry(3))
                .with_fallback(fallback),
        )
    }

    fn ctx_with_cache(cache: &Arc<MemoryCache>, mod_time: i64) -> ParseContext {
        let cache: Arc<dyn CacheStore> = cache.clone();
        ParseContext::new("doc.md", "- [ ] t").with_mod_time(mod_time).with_cache(cache)
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let plugin = Arc::new(FlakyPlugin::new(2, ParseError::extraction("flaky")));
        let report = executor(plugin.clone(), FallbackStrategy::None)
            .execute(&ParseContext::new("doc.md", "x"))
            .await;
        assert!(report.result.is_success());
        assert_eq!(report.attempts, 3);
        assert_eq!(plugin.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let plugin = Arc::new(FlakyPlugin::new(10, ParseError::extraction("down")));
        let report = executor(plugin.clone(), FallbackStrategy::None)
            .execute(&ParseContext::new("doc.md", "x"))
            .await;
        assert_eq!(report.result.error_code(), Some(ErrorCode::Extraction));
        assert_eq!(plugin.calls(), 4);
    }

    #[tokio::test]
    async fn test_non_recoverable_stops_immediately() {
        let plugin = Arc::new(FlakyPlugin::new(10, ParseError::fatal("corrupt")));
        let report = executor(plugin.clone(), FallbackStrategy::None)
            .execute(&ParseContext::new("doc.md", "x"))
            .await;
        assert!(!report.result.is_success());
        assert_eq!(plugin.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_context_never_reaches_plugin() {
        let plugin = Arc::new(FlakyPlugin::new(0, ParseError::extraction("unused")));
        let cache = Arc::new(MemoryCache::new());
        let exec = executor(plugin.clone(), FallbackStrategy::Cache);
        let ctx = ParseContext::new("", "x").with_cache(cache.clone());
        let report = exec.execute(&ctx).await;
        assert_eq!(report.result.error_code(), Some(ErrorCode::Validation));
        assert_eq!(report.attempts, 0);
        assert_eq!(plugin.calls(), 0);
        assert!(cache.is_empty("parser:markdown"));

        let mut stats = PluginStats::new();
        report.record_into(&mut stats);
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_recoverable_and_retried() {
        let plugin = Arc::new(FlakyPlugin::slow(Duration::from_millis(200)));
        let exec = PluginExecutor::new(plugin.clone()).with_options(
            ExecutorOptions::default()
                .with_timeout(Duration::from_millis(20))
                .with_retry(fast_retry(1)),
        );
        let report = exec.execute(&ParseContext::new("doc.md", "x")).await;
        assert_eq!(report.result.error_code(), Some(ErrorCode::Timeout));
        assert_eq!(plugin.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_first_lookup() {
        let cache = Arc::new(MemoryCache::new());
        let plugin = Arc::new(FlakyPlugin::new(0, ParseError::extraction("unused")));
        let exec = executor(plugin.clone(), FallbackStrategy::None);

        let first = exec.execute(&ctx_with_cache(&cache, 1)).await;
        assert!(!first.cache_hit);
        let second = exec.execute(&ctx_with_cache(&cache, 1)).await;
        assert!(second.cache_hit);
        assert!(second.result.is_from_cache());
        assert_eq!(second.attempts, 0);
        assert_eq!(plugin.calls(), 1);
        assert_eq!(first.result.tasks(), second.result.tasks());

        // A new mod time is a new generation
        let third = exec.execute(&ctx_with_cache(&cache, 2)).await;
        assert!(!third.cache_hit);
        assert_eq!(plugin.calls(), 2);
    }

    #[tokio::test]
    async fn test_new_generation_replaces_older_ones() {
        let cache = Arc::new(MemoryCache::new());
        let plugin = Arc::new(FlakyPlugin::new(0, ParseError::extraction("unused")));
        let exec = executor(plugin.clone(), FallbackStrategy::None);
        let other: Arc<dyn CacheStore> = cache.clone();
        let other_doc = ParseContext::new("doc.md.bak", "- [ ] t").with_cache(other);
        exec.execute(&other_doc).await;

        for mod_time in 1..=6 {
            assert!(exec.execute(&ctx_with_cache(&cache, mod_time)).await.result.is_success());
        }

        // Two keys per document: its newest mod time and latest
        assert_eq!(cache.len("parser:markdown"), 4);
        assert!(exec.execute(&ctx_with_cache(&cache, 6)).await.cache_hit);
        assert!(!exec.execute(&ctx_with_cache(&cache, 5)).await.cache_hit);
        assert!(exec.execute(&other_doc).await.cache_hit);
    }

    #[tokio::test]
    async fn test_cache_fallback_serves_latest_generation() {
        let cache = Arc::new(MemoryCache::new());
        let good = PluginExecutor::new(Arc::new(MarkdownPlugin::new()));
        assert!(good.execute(&ctx_with_cache(&cache, 1)).await.result.is_success());

        let failing = Arc::new(FlakyPlugin::new(10, ParseError::extraction("down")));
        let report = executor(failing, FallbackStrategy::Cache)
            .execute(&ctx_with_cache(&cache, 2))
            .await;
        assert!(report.result.is_success());
        assert!(report.result.is_from_cache());
        assert_eq!(report.result.tasks().map(<[TaskRecord]>::len), Some(1));
    }

    #[tokio::test]
    async fn test_cache_fallback_without_entry_reports_error() {
        let cache = Arc::new(MemoryCache::new());
        let failing = Arc::new(FlakyPlugin::new(10, ParseError::extraction("down")));
        let report = executor(failing, FallbackStrategy::Cache)
            .execute(&ctx_with_cache(&cache, 2))
            .await;
        assert_eq!(report.result.error_code(), Some(ErrorCode::Extraction));
    }

    #[tokio::test]
    async fn test_default_values_fallback() {
        let failing = Arc::new(FlakyPlugin::new(10, ParseError::fatal("bad")));
        let report = executor(failing, FallbackStrategy::DefaultValues)
            .execute(&ParseContext::new("doc.md", "x"))
            .await;
        let tasks = report.result.tasks().unwrap();
        assert_eq!(tasks[0].content, "default");
    }

    #[tokio::test]
    async fn test_alternate_parser_fallback() {
        let failing = Arc::new(FlakyPlugin::new(10, ParseError::fatal("bad")));
        let exec = executor(failing, FallbackStrategy::AlternateParser).with_alternate(Arc::new(MarkdownPlugin::new()));
        let report = exec.execute(&ParseContext::new("doc.md", "- [ ] from alternate")).await;
        let tasks = report.result.tasks().unwrap();
        assert_eq!(tasks[0].content, "from alternate");
    }

    #[tokio::test]
    async fn test_skip_does_not_retry() {
        let plugin = Arc::new(FlakyPlugin::new(10, ParseError::extraction("flaky")));
        let report = executor(plugin.clone(), FallbackStrategy::Skip)
            .execute(&ParseContext::new("doc.md", "x"))
            .await;
        assert_eq!(report.result.error_code(), Some(ErrorCode::Skipped));
        assert_eq!(plugin.calls(), 1);
        match report.result {
            ParseResult::Error { details, .. } => assert!(details.unwrap()["cause"].is_string()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_runner_tracks_health() {
        let plugin = Arc::new(FlakyPlugin::new(10, ParseError::fatal("bad")));
        let runner = PluginRunner::new(executor(plugin, FallbackStrategy::None));
        for _ in 0..3 {
            runner.parse(&ParseContext::new("doc.md", "x")).await;
        }
        assert_eq!(runner.stats().failures, 3);
        assert!(!runner.is_healthy());
    }

    #[test]
    fn test_options_yaml() {
        let yaml = "timeout-ms: 250\nfallback: cache\nretry:\n  max-retries: 1\n";
        let options: ExecutorOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(options.fallback, FallbackStrategy::Cache);
        assert_eq!(options.retry.max_retries, 1);
        assert!(options.cache_ttl.is_none());
    }
}
