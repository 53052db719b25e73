//! Pending work: scheduler tasks and the priority queue that holds them.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::context::{ParseContext, ParsePriority};
use crate::domain::{ParseResult, PluginType};
use crate::id::{generate_correlation_id, generate_plugin_task_id};

/// One submitted parse, from admission until its result is delivered
#[derive(Debug)]
pub struct PluginTask {
    pub id: String,
    pub context: ParseContext,
    /// Plugin the caller asked for
    pub requested: PluginType,
    /// Plugin the task is currently routed to; differs from `requested` after fallback
    pub plugin_type: PluginType,
    pub priority: ParsePriority,
    pub enqueued_at: Instant,
    pub deadline: Option<Instant>,
    /// Times the task was re-routed to another plugin
    pub retry_count: u32,
    /// Plugin types already attempted, in order
    pub tried: Vec<PluginType>,
    responder: oneshot::Sender<ParseResult>,
}

impl PluginTask {
    pub fn new(
        mut context: ParseContext,
        plugin_type: PluginType,
        priority: ParsePriority,
        deadline: Option<Instant>,
        responder: oneshot::Sender<ParseResult>,
    ) -> Self {
        if context.correlation_id.is_none() {
            context.correlation_id = Some(generate_correlation_id());
        }
        Self {
            id: generate_plugin_task_id(),
            context,
            requested: plugin_type,
            plugin_type,
            priority,
            enqueued_at: Instant::now(),
            deadline,
            retry_count: 0,
            tried: Vec::new(),
            responder,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }

    pub fn mark_tried(&mut self, plugin_type: PluginType) {
        if !self.tried.contains(&plugin_type) {
            self.tried.push(plugin_type);
        }
    }

    /// Deliver the result. Consumes the task, so a result is sent at most once.
    /// Returns false if the caller stopped waiting.
    pub fn respond(self, result: ParseResult) -> bool {
        self.responder.send(result).is_ok()
    }
}

/// Bounded queue ordered by priority, FIFO within a priority
#[derive(Debug)]
pub struct TaskQueue {
    items: VecDeque<PluginTask>,
    max_size: usize,
}

impl TaskQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Insert before the first task of lower priority. Hands the task back when full.
    pub fn push(&mut self, task: PluginTask) -> Result<(), PluginTask> {
        if self.is_full() {
            return Err(task);
        }
        let urgency = task.priority.urgency();
        let pos = self
            .items
            .iter()
            .position(|queued| queued.priority.urgency() < urgency)
            .unwrap_or(self.items.len());
        self.items.insert(pos, task);
        Ok(())
    }

    pub fn take(&mut self, index: usize) -> Option<PluginTask> {
        self.items.remove(index)
    }

    /// Remove and return every task whose deadline has passed
    pub fn drain_expired(&mut self, now: Instant) -> Vec<PluginTask> {
        let (expired, live): (Vec<_>, Vec<_>) = self.items.drain(..).partition(|t| t.is_expired(now));
        self.items = live.into();
        expired
    }

    pub fn drain_all(&mut self) -> Vec<PluginTask> {
        self.items.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginTask> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }
}
