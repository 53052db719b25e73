//! Plugin manager: the scheduling loop and its public handle.
//!
//! All scheduler state (queue, circuit breakers, loads, statistics) lives in
//! one `ManagerLoop` owned by a single tokio task. `PluginManager` is a cheap,
//! cloneable handle that talks to it over an mpsc command channel. Parses run
//! in spawned tasks and report back over a completion channel, so nothing the
//! loop owns is ever touched from another task.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::queue::{PluginTask, TaskQueue};
use super::registry::PluginRegistry;
use super::score::{PluginLoad, ScoreWeights, pick_best, score};
use crate::cache::{CacheStore, parse_namespace};
use crate::context::{ParseContext, ParsePriority};
use crate::domain::{EventSink, ParseEvent, ParseResult, PluginType, TracingEventSink};
use crate::error::{ErrorCode, ParseError, Result, TaskmillError};
use crate::plugin::{ExecutionReport, PluginExecutor, PluginStats, StatsSnapshot};

/// Configuration for the PluginManager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Parses allowed in flight across all plugins
    pub max_concurrent_tasks: usize,
    /// Queued tasks beyond which submissions fail with QueueFull
    pub max_queue_size: usize,
    /// How often the loop re-checks deadlines and circuit recovery
    pub tick_interval: Duration,
    pub weights: ScoreWeights,
    pub circuit: CircuitBreakerConfig,
    /// Deadline applied to submissions that do not set one
    pub default_deadline: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
            max_queue_size: 1_000,
            tick_interval: Duration::from_millis(100),
            weights: ScoreWeights::default(),
            circuit: CircuitBreakerConfig::default(),
            default_deadline: None,
        }
    }
}

impl ManagerConfig {
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn with_max_queue_size(mut self, max: usize) -> Self {
        self.max_queue_size = max;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_circuit(mut self, circuit: CircuitBreakerConfig) -> Self {
        self.circuit = circuit;
        self
    }
}

/// Per-submission overrides
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Overrides the context's priority
    pub priority: Option<ParsePriority>,
    /// Give up with DeadlineExceeded if the task is still queued after this long
    pub deadline: Option<Duration>,
}

impl SubmitOptions {
    pub fn with_priority(mut self, priority: ParsePriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Waits for the result of one submission
#[derive(Debug)]
pub struct TaskHandle {
    pub id: String,
    rx: oneshot::Receiver<ParseResult>,
}

impl TaskHandle {
    pub async fn result(self) -> ParseResult {
        self.rx
            .await
            .unwrap_or_else(|_| ParseResult::from_error(&ParseError::Cancelled(self.id)))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSnapshot {
    pub plugin_type: PluginType,
    pub circuit: CircuitState,
    pub load: usize,
    pub max_concurrency: usize,
    pub stats: StatsSnapshot,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSnapshot {
    pub active: usize,
    pub queued: usize,
    pub plugins: Vec<PluginSnapshot>,
}

impl ManagerSnapshot {
    pub fn plugin(&self, plugin_type: PluginType) -> Option<&PluginSnapshot> {
        self.plugins.iter().find(|p| p.plugin_type == plugin_type)
    }
}

enum Command {
    Submit(PluginTask),
    Snapshot(oneshot::Sender<ManagerSnapshot>),
    CancelAll(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the scheduling loop.
#[derive(Clone)]
pub struct PluginManager {
    cmd_tx: mpsc::Sender<Command>,
    registry: Arc<PluginRegistry>,
    cache: Option<Arc<dyn CacheStore>>,
    default_deadline: Option<Duration>,
}

impl PluginManager {
    /// Spawn the manager loop with lifecycle events logged through tracing.
    /// Must be called from within a tokio runtime.
    pub fn start(registry: PluginRegistry, config: ManagerConfig, cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self::start_with_events(registry, config, cache, Arc::new(TracingEventSink))
    }

    pub fn start_with_events(
        registry: PluginRegistry,
        config: ManagerConfig,
        cache: Option<Arc<dyn CacheStore>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let registry = Arc::new(registry);
        let default_deadline = config.default_deadline;

        info!(
            plugins = ?registry.types(),
            max_concurrent = config.max_concurrent_tasks,
            max_queue = config.max_queue_size,
            "Starting plugin manager"
        );

        let manager_loop = ManagerLoop::new(config, registry.clone(), cache.clone(), events);
        tokio::spawn(manager_loop.run(cmd_rx));

        Self {
            cmd_tx,
            registry,
            cache,
            default_deadline,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Queue a parse of `ctx` with `plugin_type`
    pub async fn submit(&self, ctx: ParseContext, plugin_type: PluginType) -> Result<TaskHandle> {
        self.submit_with(ctx, plugin_type, SubmitOptions::default()).await
    }

    pub async fn submit_with(
        &self,
        ctx: ParseContext,
        plugin_type: PluginType,
        options: SubmitOptions,
    ) -> Result<TaskHandle> {
        let registration = self
            .registry
            .get(plugin_type)
            .ok_or_else(|| TaskmillError::PluginNotRegistered(plugin_type.to_string()))?;

        let priority = registration.effective_priority(options.priority.unwrap_or(ctx.priority));
        let deadline = options.deadline.or(self.default_deadline).map(|d| Instant::now() + d);
        let (tx, rx) = oneshot::channel();
        let task = PluginTask::new(ctx, plugin_type, priority, deadline, tx);
        let id = task.id.clone();

        self.send(Command::Submit(task)).await?;
        Ok(TaskHandle { id, rx })
    }

    /// Submit and wait for the result
    pub async fn parse(&self, ctx: ParseContext, plugin_type: PluginType) -> Result<ParseResult> {
        Ok(self.submit(ctx, plugin_type).await?.result().await)
    }

    pub async fn snapshot(&self) -> Result<ManagerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| unavailable())
    }

    /// Reject every queued and running task with Cancelled. Returns how many were cancelled.
    pub async fn cancel_all(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::CancelAll(tx)).await?;
        rx.await.map_err(|_| unavailable())
    }

    /// Drop cached results for `path` in every registered plugin's namespace
    pub async fn invalidate(&self, path: &str) -> usize {
        let Some(cache) = &self.cache else { return 0 };
        let mut removed = 0;
        for plugin_type in self.registry.types() {
            removed += cache.invalidate_by_path(path, &parse_namespace(plugin_type)).await;
        }
        debug!(path = %path, removed, "Invalidated cached parses");
        removed
    }

    /// Cancel outstanding work and stop the loop
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx)).await?;
        rx.await.map_err(|_| unavailable())
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| unavailable())
    }
}

fn unavailable() -> TaskmillError {
    TaskmillError::ManagerUnavailable("manager loop has stopped".to_string())
}

/// Scheduler-side state for one plugin type
struct PluginSlot {
    executor: PluginExecutor,
    breaker: CircuitBreaker,
    stats: PluginStats,
    /// Dispatched tasks not yet completed, including those waiting on the semaphore
    active: usize,
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
}

impl PluginSlot {
    fn load(&self) -> PluginLoad {
        PluginLoad {
            active: self.active,
            max_concurrency: self.max_concurrency,
            average_latency: self.stats.average_latency(),
            healthy: self.stats.is_healthy(),
        }
    }
}

struct ActiveTask {
    task: PluginTask,
    handle: JoinHandle<()>,
}

struct Completion {
    task_id: String,
    plugin_type: PluginType,
    report: ExecutionReport,
}

struct ManagerLoop {
    config: ManagerConfig,
    registry: Arc<PluginRegistry>,
    cache: Option<Arc<dyn CacheStore>>,
    events: Arc<dyn EventSink>,
    queue: TaskQueue,
    plugins: HashMap<PluginType, PluginSlot>,
    active: HashMap<String, ActiveTask>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl ManagerLoop {
    fn new(
        config: ManagerConfig,
        registry: Arc<PluginRegistry>,
        cache: Option<Arc<dyn CacheStore>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let mut plugins = HashMap::new();
        for plugin_type in registry.types() {
            let (Some(registration), Some(executor)) = (registry.get(plugin_type), registry.executor(plugin_type))
            else {
                continue;
            };
            let max_concurrency = registration.max_concurrency.max(1);
            plugins.insert(
                plugin_type,
                PluginSlot {
                    executor,
                    breaker: CircuitBreaker::new(plugin_type, config.circuit.clone()),
                    stats: PluginStats::new(),
                    active: 0,
                    max_concurrency,
                    semaphore: Arc::new(Semaphore::new(max_concurrency)),
                },
            );
        }

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            queue: TaskQueue::new(config.max_queue_size),
            config,
            registry,
            cache,
            events,
            plugins,
            active: HashMap::new(),
            completion_tx,
            completion_rx,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Submit(task)) => self.admit(task),
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::CancelAll(reply)) => {
                        let _ = reply.send(self.cancel_all());
                    }
                    Some(Command::Shutdown(reply)) => {
                        // Later sends fail instead of sitting in the buffer
                        cmd_rx.close();
                        self.cancel_all();
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.cancel_all();
                        break;
                    }
                },
                Some(completion) = self.completion_rx.recv() => self.complete(completion),
                _ = ticker.tick() => {}
            }
            self.pump();
        }

        info!("Plugin manager stopped");
    }

    /// Run now, queue, or reject a freshly submitted task
    fn admit(&mut self, mut task: PluginTask) {
        let now = Instant::now();
        if task.is_expired(now) {
            let err = ParseError::DeadlineExceeded(task.id.clone());
            self.finish(task, ParseResult::from_error(&err));
            return;
        }

        let Some(slot) = self.plugins.get_mut(&task.plugin_type) else {
            let err = ParseError::fatal(format!("no executor for {}", task.plugin_type));
            self.finish(task, ParseResult::from_error(&err));
            return;
        };

        if slot.breaker.is_open(now) {
            debug!(task_id = %task.id, plugin_type = %task.plugin_type, "Circuit open at submission");
            task.mark_tried(task.plugin_type);
            let err = ParseError::CircuitOpen(task.plugin_type.to_string());
            self.route_fallback(task, ParseResult::from_error(&err));
            return;
        }

        let healthy = slot.stats.is_healthy();
        let has_capacity = self.active.len() < self.config.max_concurrent_tasks;
        if has_capacity && healthy && (task.priority == ParsePriority::High || self.queue.is_empty()) {
            self.dispatch(task);
        } else {
            self.enqueue(task);
        }
    }

    fn enqueue(&mut self, task: PluginTask) {
        let queued = self.queue.len();
        match self.queue.push(task) {
            Ok(()) => debug!(queued = queued + 1, "Task queued"),
            Err(task) => {
                warn!(task_id = %task.id, queued, "Queue full, rejecting task");
                let err = ParseError::QueueFull(queued);
                self.finish(task, ParseResult::from_error(&err));
            }
        }
    }

    /// Fill free slots from the queue by score
    fn pump(&mut self) {
        let now = Instant::now();
        for task in self.queue.drain_expired(now) {
            debug!(task_id = %task.id, "Deadline passed while queued");
            let err = ParseError::DeadlineExceeded(task.id.clone());
            self.finish(task, ParseResult::from_error(&err));
        }

        while self.active.len() < self.config.max_concurrent_tasks && !self.queue.is_empty() {
            let open: HashSet<PluginType> = self
                .plugins
                .iter_mut()
                .filter_map(|(plugin_type, slot)| slot.breaker.is_open(now).then_some(*plugin_type))
                .collect();

            let weights = &self.config.weights;
            let plugins = &self.plugins;
            let candidates = self.queue.iter().enumerate().filter_map(|(index, task)| {
                if open.contains(&task.plugin_type) {
                    return None;
                }
                let slot = plugins.get(&task.plugin_type)?;
                Some((index, score(task.priority, &slot.load(), weights)))
            });

            let Some(task) = pick_best(candidates).and_then(|index| self.queue.take(index)) else {
                break;
            };
            self.dispatch(task);
        }
    }

    fn dispatch(&mut self, mut task: PluginTask) {
        let plugin_type = task.plugin_type;
        let Some(slot) = self.plugins.get_mut(&plugin_type) else {
            let err = ParseError::fatal(format!("no executor for {}", plugin_type));
            self.finish(task, ParseResult::from_error(&err));
            return;
        };
        slot.active += 1;
        task.mark_tried(plugin_type);

        let executor = slot.executor.clone();
        let semaphore = slot.semaphore.clone();
        let mut ctx = task.context.clone();
        if ctx.cache.is_none() {
            ctx.cache = self.cache.clone();
        }
        let completion_tx = self.completion_tx.clone();
        let task_id = task.id.clone();

        debug!(
            task_id = %task.id,
            plugin_type = %plugin_type,
            priority = %task.priority,
            waited_ms = task.enqueued_at.elapsed().as_millis() as u64,
            "Dispatching task"
        );
        self.events.emit(
            ParseEvent::started(&task.context.file_path, plugin_type).with_correlation(task.context.correlation_id.clone()),
        );

        let handle = tokio::spawn(async move {
            // Per-plugin cap; the permit is released when this task ends or is aborted
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let started = Instant::now();
            let report = match AssertUnwindSafe(executor.execute(&ctx)).catch_unwind().await {
                Ok(report) => report,
                Err(_) => {
                    error!(task_id = %task_id, plugin_type = %plugin_type, "Plugin panicked during parse");
                    panicked_report(plugin_type, started.elapsed())
                }
            };
            let _ = completion_tx.send(Completion {
                task_id,
                plugin_type,
                report,
            });
        });

        self.active.insert(task.id.clone(), ActiveTask { task, handle });
    }

    fn complete(&mut self, completion: Completion) {
        // Cancelled tasks are already gone
        let Some(active) = self.active.remove(&completion.task_id) else {
            return;
        };
        let report = completion.report;
        let now = Instant::now();

        if let Some(slot) = self.plugins.get_mut(&completion.plugin_type) {
            slot.active = slot.active.saturating_sub(1);
            report.record_into(&mut slot.stats);
            if report.result.is_success() {
                slot.breaker.record_success(now);
            } else if report.attempts > 0 {
                slot.breaker.record_failure(now);
            }
        }

        let reroute = !report.result.is_success()
            && report.attempts > 0
            && report.result.error_code() != Some(ErrorCode::Skipped);
        if reroute {
            self.route_fallback(active.task, report.result);
        } else {
            self.finish(active.task, report.result);
        }
    }

    /// Send a failed task to the next untried alternate whose circuit is not open
    fn route_fallback(&mut self, mut task: PluginTask, failure: ParseResult) {
        let now = Instant::now();
        let next = self.registry.alternates(task.requested).into_iter().find(|alt| {
            !task.tried.contains(alt) && self.plugins.get_mut(alt).is_some_and(|slot| !slot.breaker.is_open(now))
        });

        let Some(alternate) = next else {
            self.finish(task, failure);
            return;
        };

        warn!(
            task_id = %task.id,
            from = %task.plugin_type,
            to = %alternate,
            "Routing task to fallback plugin"
        );
        task.plugin_type = alternate;
        task.retry_count += 1;
        if self.active.len() < self.config.max_concurrent_tasks {
            self.dispatch(task);
        } else {
            self.enqueue(task);
        }
    }

    /// Emit the terminal event and deliver the result
    fn finish(&mut self, task: PluginTask, result: ParseResult) {
        let duration_ms = task.enqueued_at.elapsed().as_millis() as u64;
        let path = task.context.file_path.clone();
        let event = match &result {
            ParseResult::Success { data, .. } => ParseEvent::completed(&path, task.plugin_type, duration_ms, data.len()),
            ParseResult::Error { message, .. } => ParseEvent::failed(&path, task.plugin_type, duration_ms, message),
        };
        self.events.emit(event.with_correlation(task.context.correlation_id.clone()));

        let task_id = task.id.clone();
        if !task.respond(result) {
            debug!(task_id = %task_id, "Caller dropped its handle before the result arrived");
        }
    }

    fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;

        for (_, active) in self.active.drain() {
            active.handle.abort();
            if let Some(slot) = self.plugins.get_mut(&active.task.plugin_type) {
                slot.active = slot.active.saturating_sub(1);
            }
            let err = ParseError::Cancelled(active.task.id.clone());
            finish_cancelled(self.events.as_ref(), active.task, &err);
            cancelled += 1;
        }

        for task in self.queue.drain_all() {
            let err = ParseError::Cancelled(task.id.clone());
            finish_cancelled(self.events.as_ref(), task, &err);
            cancelled += 1;
        }

        if cancelled > 0 {
            info!(cancelled, "Cancelled all outstanding tasks");
        }
        cancelled
    }

    fn snapshot(&mut self) -> ManagerSnapshot {
        let now = Instant::now();
        let mut plugins: Vec<PluginSnapshot> = self
            .plugins
            .iter_mut()
            .map(|(plugin_type, slot)| PluginSnapshot {
                plugin_type: *plugin_type,
                circuit: slot.breaker.poll(now),
                load: slot.active,
                max_concurrency: slot.max_concurrency,
                stats: slot.stats.snapshot(),
            })
            .collect();
        plugins.sort_by_key(|p| p.plugin_type);

        ManagerSnapshot {
            active: self.active.len(),
            queued: self.queue.len(),
            plugins,
        }
    }
}

/// A panic counts as one failed attempt so the slot, breaker and stats all see it
fn panicked_report(plugin_type: PluginType, elapsed: Duration) -> ExecutionReport {
    let err = ParseError::fatal(format!("{} plugin panicked", plugin_type));
    ExecutionReport {
        result: ParseResult::from_error(&err),
        attempts: 1,
        elapsed,
        cache_hit: false,
    }
}

fn finish_cancelled(events: &dyn EventSink, task: PluginTask, err: &ParseError) {
    let duration_ms = task.enqueued_at.elapsed().as_millis() as u64;
    events.emit(
        ParseEvent::failed(&task.context.file_path, task.plugin_type, duration_ms, &err.to_string())
            .with_correlation(task.context.correlation_id.clone()),
    );
    task.respond(ParseResult::from_error(err));
}
