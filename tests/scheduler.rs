//! Scheduler integration tests
//!
//! Drives the plugin manager through its public handle with mock plugins.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use taskmill::cache::{CacheStore, MemoryCache};
use taskmill::config::GlobalConfig;
use taskmill::context::{ParseContext, ParsePriority};
use taskmill::domain::{ChannelEventSink, ParseEventKind, PluginType, TaskRecord};
use taskmill::error::{ErrorCode, ParseError};
use taskmill::plugin::{ExecutorOptions, FallbackStrategy, MarkdownPlugin, ParserPlugin, RetryPolicy};
use taskmill::scheduler::{
    CircuitBreakerConfig, CircuitState, ManagerConfig, PluginManager, PluginRegistration, PluginRegistry,
    SubmitOptions,
};

/// Markdown-backed plugin that can be switched into failing and tracks peak concurrency
struct SwitchPlugin {
    plugin_type: PluginType,
    failing: AtomicBool,
    delay: Duration,
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl SwitchPlugin {
    fn new(plugin_type: PluginType, failing: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            plugin_type,
            failing: AtomicBool::new(failing),
            delay,
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParserPlugin for SwitchPlugin {
    fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    async fn parse_internal(&self, ctx: &ParseContext) -> Result<Vec<TaskRecord>, ParseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(ParseError::fatal("backend unavailable"));
        }
        MarkdownPlugin::new().parse_internal(ctx).await
    }
}

fn register(registry: &mut PluginRegistry, plugin: Arc<SwitchPlugin>, options: ExecutorOptions) {
    let plugin_type = plugin.plugin_type;
    registry.register(
        PluginRegistration::new(plugin_type, move || plugin.clone() as Arc<dyn ParserPlugin>)
            .with_max_concurrency(8)
            .with_options(options),
    );
}

fn no_retry() -> ExecutorOptions {
    ExecutorOptions::default().with_retry(RetryPolicy::none())
}

fn note(path: &str, mod_time: i64) -> ParseContext {
    ParseContext::new(path, "- [ ] Ship release #work\n  - [x] Tag build").with_mod_time(mod_time)
}

/// Integration test: a failing plugin with Cache fallback serves the last good parse
#[tokio::test]
async fn test_cache_fallback_example() {
    let plugin = SwitchPlugin::new(PluginType::Markdown, false, Duration::ZERO);
    let mut registry = PluginRegistry::new();
    register(&mut registry, plugin.clone(), no_retry().with_fallback(FallbackStrategy::Cache));
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let manager = PluginManager::start(registry, ManagerConfig::default(), Some(cache));

    let first = manager.parse(note("release.md", 1), PluginType::Markdown).await.unwrap();
    assert!(first.is_success());
    assert!(!first.is_from_cache());

    plugin.set_failing(true);
    let second = manager.parse(note("release.md", 2), PluginType::Markdown).await.unwrap();
    assert!(second.is_success());
    assert!(second.is_from_cache());
    assert_eq!(second.tasks(), first.tasks());
    assert_eq!(plugin.calls(), 2);
}

/// Integration test: failures open the circuit, recovery half-opens it, a success closes it
#[tokio::test]
async fn test_circuit_breaker_lifecycle() {
    let plugin = SwitchPlugin::new(PluginType::Markdown, true, Duration::ZERO);
    let mut registry = PluginRegistry::new();
    register(&mut registry, plugin.clone(), no_retry());
    let config = ManagerConfig::default()
        .with_tick_interval(Duration::from_millis(10))
        .with_circuit(
            CircuitBreakerConfig::default()
                .with_failure_threshold(2)
                .with_recovery_timeout(Duration::from_millis(60))
                .with_success_threshold(1),
        );
    let manager = PluginManager::start(registry, config, None);

    for i in 0..2 {
        let result = manager.parse(note(&format!("doc{}.md", i), 1), PluginType::Markdown).await.unwrap();
        assert_eq!(result.error_code(), Some(ErrorCode::Extraction));
    }
    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.plugin(PluginType::Markdown).unwrap().circuit, CircuitState::Open);

    // Fails fast without touching the plugin
    let result = manager.parse(note("doc2.md", 1), PluginType::Markdown).await.unwrap();
    assert_eq!(result.error_code(), Some(ErrorCode::CircuitOpen));
    assert_eq!(plugin.calls(), 2);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.plugin(PluginType::Markdown).unwrap().circuit, CircuitState::HalfOpen);

    plugin.set_failing(false);
    let result = manager.parse(note("doc3.md", 1), PluginType::Markdown).await.unwrap();
    assert!(result.is_success());
    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.plugin(PluginType::Markdown).unwrap().circuit, CircuitState::Closed);
}

/// Integration test: the global in-flight limit holds under a burst
#[tokio::test]
async fn test_max_concurrency_under_load() {
    let plugin = SwitchPlugin::new(PluginType::Markdown, false, Duration::from_millis(10));
    let mut registry = PluginRegistry::new();
    register(&mut registry, plugin.clone(), no_retry());
    let manager = PluginManager::start(registry, ManagerConfig::default().with_max_concurrent_tasks(4), None);

    let mut handles = Vec::new();
    for i in 0..40 {
        let priority = if i % 3 == 0 { ParsePriority::High } else { ParsePriority::Low };
        let options = SubmitOptions::default().with_priority(priority);
        handles.push(
            manager
                .submit_with(note(&format!("load{}.md", i), 1), PluginType::Markdown, options)
                .await
                .unwrap(),
        );
    }
    let results = futures::future::join_all(handles.into_iter().map(|h| h.result())).await;

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(plugin.calls(), 40);
    assert!(plugin.peak.load(Ordering::SeqCst) <= 4);

    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.active, 0);
    assert_eq!(snapshot.queued, 0);
    assert_eq!(snapshot.plugin(PluginType::Markdown).unwrap().stats.successes, 40);
}

/// Integration test: a failing canvas parse is re-routed to the markdown plugin
#[tokio::test]
async fn test_canvas_routes_to_markdown() {
    let canvas = SwitchPlugin::new(PluginType::Canvas, true, Duration::ZERO);
    let (events, mut rx) = ChannelEventSink::new(32);
    let mut registry = PluginRegistry::with_builtin();
    register(&mut registry, canvas.clone(), no_retry());
    let manager = PluginManager::start_with_events(registry, ManagerConfig::default(), None, Arc::new(events));

    let ctx = ParseContext::new("board.canvas", "- [ ] Plain text board").with_correlation_id("req-7");
    let result = manager.parse(ctx, PluginType::Canvas).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.source().unwrap().plugin_type, PluginType::Markdown);
    assert_eq!(result.tasks().unwrap()[0].content, "Plain text board");
    assert_eq!(canvas.calls(), 1);

    manager.shutdown().await.unwrap();
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.correlation_id.as_deref(), Some("req-7"));
        seen.push((event.plugin_type, event.event_type()));
    }
    assert_eq!(
        seen,
        vec![
            (PluginType::Canvas, "parse-started"),
            (PluginType::Markdown, "parse-started"),
            (PluginType::Markdown, "parse-completed"),
        ]
    );
}

/// Integration test: queued work past its deadline is rejected
#[tokio::test]
async fn test_deadline_exceeded_while_queued() {
    let plugin = SwitchPlugin::new(PluginType::Markdown, false, Duration::from_millis(150));
    let mut registry = PluginRegistry::new();
    register(&mut registry, plugin.clone(), no_retry());
    let config = ManagerConfig::default()
        .with_max_concurrent_tasks(1)
        .with_tick_interval(Duration::from_millis(5));
    let manager = PluginManager::start(registry, config, None);

    let slow = manager.submit(note("slow.md", 1), PluginType::Markdown).await.unwrap();
    let late = manager
        .submit_with(
            note("late.md", 1),
            PluginType::Markdown,
            SubmitOptions::default().with_deadline(Duration::from_millis(20)),
        )
        .await
        .unwrap();

    assert_eq!(late.result().await.error_code(), Some(ErrorCode::DeadlineExceeded));
    assert!(slow.result().await.is_success());
    assert_eq!(plugin.calls(), 1);
}

/// Integration test: cancel_all resolves every outstanding handle
#[tokio::test]
async fn test_cancel_all_outstanding() {
    let (events, mut rx) = ChannelEventSink::new(64);
    let plugin = SwitchPlugin::new(PluginType::Markdown, false, Duration::from_secs(5));
    let mut registry = PluginRegistry::new();
    register(&mut registry, plugin, no_retry());
    let manager = PluginManager::start_with_events(
        registry,
        ManagerConfig::default().with_max_concurrent_tasks(2),
        None,
        Arc::new(events),
    );

    let mut handles = Vec::new();
    for i in 0..5 {
        handles.push(manager.submit(note(&format!("c{}.md", i), 1), PluginType::Markdown).await.unwrap());
    }
    assert_eq!(manager.cancel_all().await.unwrap(), 5);
    for handle in handles {
        assert_eq!(handle.result().await.error_code(), Some(ErrorCode::Cancelled));
    }

    let mut failed = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event.kind, ParseEventKind::ParseFailed { .. }) {
            failed += 1;
        }
    }
    assert_eq!(failed, 5);
}

/// Integration test: a manager built from YAML config parses real files and honors invalidation
#[tokio::test]
async fn test_config_driven_manager() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("taskmill.yml");
    std::fs::write(
        &config_path,
        "scheduler:\n  max-concurrent-tasks: 2\nretry:\n  max-retries: 0\nplugins:\n  markdown:\n    priority: high\n",
    )
    .unwrap();
    let config = GlobalConfig::load(Some(&config_path)).unwrap();
    config.validate().unwrap();

    let doc_path = dir.path().join("todo.md");
    std::fs::write(&doc_path, "## Inbox\n- [ ] Pay rent 📅 2025-02-01\n").unwrap();
    let path = doc_path.to_string_lossy().into_owned();
    let content = std::fs::read_to_string(&doc_path).unwrap();

    let cache: Arc<dyn CacheStore> = config.build_cache();
    let manager = PluginManager::start(config.build_registry(), config.to_manager_config(), Some(cache));
    let ctx = || {
        ParseContext::new(path.clone(), content.clone())
            .with_mod_time(10)
            .with_settings(config.extractor.clone())
    };

    let first = manager.parse(ctx(), PluginType::Markdown).await.unwrap();
    assert_eq!(first.tasks().unwrap()[0].metadata.heading_path, vec!["Inbox"]);
    assert!(manager.parse(ctx(), PluginType::Markdown).await.unwrap().is_from_cache());

    assert!(manager.invalidate(&path).await >= 1);
    assert!(!manager.parse(ctx(), PluginType::Markdown).await.unwrap().is_from_cache());

    manager.shutdown().await.unwrap();
    assert!(manager.parse(ctx(), PluginType::Markdown).await.is_err());
}
