//! Per-plugin overrides.
//!
//! Applied on top of the global retry/cache settings when the registry is built.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ParsePriority;
use crate::plugin::FallbackStrategy;
use crate::scheduler::PluginRegistration;

/// Settings that replace a plugin registration's defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PluginOverrides {
    /// Calls of this plugin allowed in flight at once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Per-call timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackStrategy>,

    /// Minimum priority for tasks routed to this plugin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<ParsePriority>,
}

impl PluginOverrides {
    pub fn is_empty(&self) -> bool {
        self.max_concurrency.is_none() && self.timeout_ms.is_none() && self.fallback.is_none() && self.priority.is_none()
    }

    /// Write every set field into the registration
    pub fn apply(&self, registration: &mut PluginRegistration) {
        if let Some(max) = self.max_concurrency {
            registration.max_concurrency = max;
        }
        if let Some(ms) = self.timeout_ms {
            registration.options.timeout = Duration::from_millis(ms);
        }
        if let Some(fallback) = self.fallback {
            registration.options.fallback = fallback;
        }
        if let Some(priority) = self.priority {
            registration.priority = priority;
        }
    }
}
