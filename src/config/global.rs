//! Global configuration.
//!
//! Loaded from ./.taskmill.yml or ~/.config/taskmill/taskmill.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::overrides::PluginOverrides;
use crate::cache::MemoryCache;
use crate::domain::PluginType;
use crate::extract::ExtractorSettings;
use crate::plugin::RetryPolicy;
use crate::scheduler::{CircuitBreakerConfig, ManagerConfig, PluginRegistry, ScoreWeights};

/// Global configuration for taskmill.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GlobalConfig {
    /// Scheduler limits and scoring.
    pub scheduler: SchedulerConfig,

    /// Circuit breaker thresholds, shared by every plugin.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy applied to every plugin.
    pub retry: RetryPolicy,

    /// Result cache settings.
    pub cache: CacheConfig,

    /// Markdown extractor settings.
    pub extractor: ExtractorSettings,

    /// Per-plugin overrides keyed by plugin type.
    pub plugins: BTreeMap<PluginType, PluginOverrides>,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .taskmill.yml in current directory
    /// 3. ~/.config/taskmill/taskmill.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".taskmill.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .taskmill.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .taskmill.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskmill").join("taskmill.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent_tasks == 0 {
            eyre::bail!("scheduler.max-concurrent-tasks must be > 0");
        }
        if self.scheduler.max_queue_size == 0 {
            eyre::bail!("scheduler.max-queue-size must be > 0");
        }
        if self.scheduler.tick_interval_ms == 0 {
            eyre::bail!("scheduler.tick-interval-ms must be > 0");
        }
        if self.scheduler.weights.total().is_nan() || self.scheduler.weights.total() <= 0.0 {
            eyre::bail!("scheduler.weights must sum to a positive value");
        }
        if self.circuit_breaker.failure_threshold == 0 {
            eyre::bail!("circuit-breaker.failure-threshold must be > 0");
        }
        if self.circuit_breaker.success_threshold == 0 {
            eyre::bail!("circuit-breaker.success-threshold must be > 0");
        }
        if self.extractor.tab_width == 0 {
            eyre::bail!("extractor.tab-width must be > 0");
        }
        for (plugin_type, overrides) in &self.plugins {
            if overrides.max_concurrency == Some(0) {
                eyre::bail!("plugins.{}.max-concurrency must be > 0", plugin_type);
            }
            if overrides.timeout_ms == Some(0) {
                eyre::bail!("plugins.{}.timeout-ms must be > 0", plugin_type);
            }
        }
        Ok(())
    }

    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_concurrent_tasks: self.scheduler.max_concurrent_tasks,
            max_queue_size: self.scheduler.max_queue_size,
            tick_interval: Duration::from_millis(self.scheduler.tick_interval_ms),
            weights: self.scheduler.weights.clone(),
            circuit: self.circuit_breaker.clone(),
            default_deadline: self.scheduler.deadline_ms.map(Duration::from_millis),
        }
    }

    /// Built-in plugins with the global retry/cache settings and per-plugin overrides applied
    pub fn build_registry(&self) -> PluginRegistry {
        let mut registry = PluginRegistry::with_builtin();
        for plugin_type in registry.types() {
            let Some(registration) = registry.get_mut(plugin_type) else {
                continue;
            };
            registration.options.retry = self.retry.clone();
            registration.options.cache_ttl = self.cache.ttl();
            if let Some(overrides) = self.plugins.get(&plugin_type) {
                overrides.apply(registration);
            }
        }
        for plugin_type in self.plugins.keys().filter(|pt| !registry.is_registered(**pt)) {
            log::warn!("Overrides for unregistered plugin '{}' ignored", plugin_type);
        }
        registry
    }

    pub fn build_cache(&self) -> Arc<MemoryCache> {
        match self.cache.ttl() {
            Some(ttl) => Arc::new(MemoryCache::with_default_ttl(ttl)),
            None => Arc::new(MemoryCache::new()),
        }
    }
}

/// Scheduler limits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Parses in flight across all plugins.
    pub max_concurrent_tasks: usize,

    /// Queued parses beyond which submissions are rejected.
    pub max_queue_size: usize,

    /// Interval for deadline and circuit recovery checks.
    pub tick_interval_ms: u64,

    /// Default queue deadline in milliseconds; unset means none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,

    pub weights: ScoreWeights,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
            max_queue_size: 1_000,
            tick_interval_ms: 100,
            deadline_ms: None,
            weights: ScoreWeights::default(),
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Entry lifetime in milliseconds; 0 keeps entries until invalidated.
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 3_600_000 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms))
    }
}
