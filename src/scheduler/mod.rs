//! Scheduler module for parse orchestration across plugins.
//!
//! This module provides:
//! - **Circuit breaker**: per-plugin fault isolation as an explicit state machine.
//! - **Task queue**: bounded, priority-ordered pending work with deadlines.
//! - **Scoring**: weighted priority/load/latency/health score for picking the next task.
//! - **Registry**: plugin registrations and the fallback compatibility table.
//! - **PluginManager**: the single-owner scheduling loop and its handle.
//!
//! # Architecture
//!
//! 1. Callers submit `(context, plugin type, priority)` through `PluginManager`
//! 2. The manager loop admits the task to a slot or queues it
//! 3. Spawned executions report back over a completion channel
//! 4. Outcomes update stats and the circuit breaker, then either resolve the
//!    caller's handle or re-route the task to a compatible plugin
//!
//! # Example
//!
//! ```ignore
//! use taskmill::scheduler::{ManagerConfig, PluginManager, PluginRegistry};
//!
//! let manager = PluginManager::start(PluginRegistry::with_builtin(), ManagerConfig::default(), None);
//! let result = manager.parse(ParseContext::new("todo.md", text), PluginType::Markdown).await?;
//! ```

mod circuit;
mod manager;
mod queue;
mod registry;
mod score;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitEvent, CircuitState, transition};
pub use manager::{
    ManagerConfig, ManagerSnapshot, PluginManager, PluginSnapshot, SubmitOptions, TaskHandle,
};
pub use queue::{PluginTask, TaskQueue};
pub use registry::{PluginFactory, PluginRegistration, PluginRegistry};
pub use score::{PluginLoad, ScoreWeights, latency_score, load_score, pick_best, priority_score, score};
