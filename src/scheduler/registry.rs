//! Plugin registrations and the fallback compatibility table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::ParsePriority;
use crate::domain::PluginType;
use crate::plugin::{CanvasPlugin, ExecutorOptions, MarkdownPlugin, ParserPlugin, PluginExecutor};

/// Builds a fresh plugin instance
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn ParserPlugin> + Send + Sync>;

/// How one plugin type is run
#[derive(Clone)]
pub struct PluginRegistration {
    pub plugin_type: PluginType,
    pub factory: PluginFactory,
    /// Minimum priority given to tasks routed to this plugin
    pub priority: ParsePriority,
    /// Calls of this plugin allowed to run at once
    pub max_concurrency: usize,
    /// Timeout, retry policy and fallback strategy
    pub options: ExecutorOptions,
}

impl PluginRegistration {
    pub fn new<F>(plugin_type: PluginType, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn ParserPlugin> + Send + Sync + 'static,
    {
        Self {
            plugin_type,
            factory: Arc::new(factory),
            priority: ParsePriority::Low,
            max_concurrency: 4,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_priority(mut self, priority: ParsePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// The more urgent of the requested priority and this plugin's floor
    pub fn effective_priority(&self, requested: ParsePriority) -> ParsePriority {
        if requested.urgency() >= self.priority.urgency() {
            requested
        } else {
            self.priority
        }
    }
}

impl fmt::Debug for PluginRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistration")
            .field("plugin_type", &self.plugin_type)
            .field("priority", &self.priority)
            .field("max_concurrency", &self.max_concurrency)
            .field("options", &self.options)
            .finish()
    }
}

/// Registered plugins plus the ordered alternates each one falls back to
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    registrations: HashMap<PluginType, PluginRegistration>,
    compatibility: HashMap<PluginType, Vec<PluginType>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Empty registry with the default compatibility table
    pub fn new() -> Self {
        let compatibility = HashMap::from([
            (PluginType::Markdown, vec![]),
            (PluginType::Canvas, vec![PluginType::Markdown]),
            (PluginType::Metadata, vec![PluginType::Markdown]),
            (PluginType::Ics, vec![]),
            (PluginType::Project, vec![PluginType::Markdown]),
        ]);
        Self {
            registrations: HashMap::new(),
            compatibility,
        }
    }

    /// Registry with the built-in markdown and canvas plugins
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(PluginRegistration::new(PluginType::Markdown, || {
            Arc::new(MarkdownPlugin::new()) as Arc<dyn ParserPlugin>
        }));
        registry.register(PluginRegistration::new(PluginType::Canvas, || {
            Arc::new(CanvasPlugin::new()) as Arc<dyn ParserPlugin>
        }));
        registry
    }

    /// Add or replace a registration
    pub fn register(&mut self, registration: PluginRegistration) {
        self.registrations.insert(registration.plugin_type, registration);
    }

    pub fn with_alternates(mut self, plugin_type: PluginType, alternates: Vec<PluginType>) -> Self {
        self.compatibility.insert(plugin_type, alternates);
        self
    }

    pub fn get(&self, plugin_type: PluginType) -> Option<&PluginRegistration> {
        self.registrations.get(&plugin_type)
    }

    pub fn get_mut(&mut self, plugin_type: PluginType) -> Option<&mut PluginRegistration> {
        self.registrations.get_mut(&plugin_type)
    }

    pub fn is_registered(&self, plugin_type: PluginType) -> bool {
        self.registrations.contains_key(&plugin_type)
    }

    /// Registered plugin types in a stable order
    pub fn types(&self) -> Vec<PluginType> {
        let mut types: Vec<PluginType> = self.registrations.keys().copied().collect();
        types.sort();
        types
    }

    /// Registered alternates for `plugin_type`, in fallback order
    pub fn alternates(&self, plugin_type: PluginType) -> Vec<PluginType> {
        self.compatibility
            .get(&plugin_type)
            .map(|alts| alts.iter().copied().filter(|alt| self.is_registered(*alt)).collect())
            .unwrap_or_default()
    }

    /// Build the executor for a plugin type; the first registered alternate
    /// backs the `AlternateParser` fallback.
    pub fn executor(&self, plugin_type: PluginType) -> Option<PluginExecutor> {
        let registration = self.get(plugin_type)?;
        let mut executor = PluginExecutor::new((registration.factory)()).with_options(registration.options.clone());
        if let Some(alternate) = self.alternates(plugin_type).first().and_then(|alt| self.get(*alt)) {
            executor = executor.with_alternate((alternate.factory)());
        }
        Some(executor)
    }
}
