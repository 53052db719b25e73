//! Parse context: the per-call input bundle handed to plugins.
//!
//! A context is owned by the call that created it. It can be recycled through
//! a `ContextPool` and projected into a `SerializedContext` to cross an
//! execution-unit boundary.

mod pool;
mod wire;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::error::ParseError;
use crate::extract::ExtractorSettings;

pub use pool::ContextPool;
pub use wire::{SERIALIZATION_VERSION, SerializedContext};

/// Kind of document being parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Markdown,
    Canvas,
    Ics,
    Other,
}

impl FileType {
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown") => Self::Markdown,
            Some(ext) if ext.eq_ignore_ascii_case("canvas") => Self::Canvas,
            Some(ext) if ext.eq_ignore_ascii_case("ics") => Self::Ics,
            Some(_) => Self::Other,
            None => Self::Markdown,
        }
    }
}

/// Scheduling urgency of a parse request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePriority {
    High,
    #[default]
    Normal,
    Low,
}

impl ParsePriority {
    /// Numeric urgency; higher sorts earlier in the queue
    pub fn urgency(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
        }
    }

    /// Rank where 0 is most urgent
    pub fn rank(&self) -> u8 {
        3 - self.urgency()
    }

    /// Map a numeric urgency level (1 = low, 2 = normal, 3+ = high)
    pub fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => Self::Low,
            2 => Self::Normal,
            _ => Self::High,
        }
    }
}

impl fmt::Display for ParsePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ParsePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => other
                .parse::<u8>()
                .map(Self::from_level)
                .map_err(|_| format!("unknown priority: {}", s)),
        }
    }
}

/// Input bundle for a single parse call
#[derive(Clone, Default)]
pub struct ParseContext {
    pub file_path: String,
    pub content: String,
    pub file_type: FileType,
    /// Modification time in ms since epoch; part of the cache key
    pub mod_time: i64,
    pub priority: ParsePriority,
    /// Opaque tracing token for one logical request
    pub correlation_id: Option<String>,
    pub settings: ExtractorSettings,
    /// Live cache handle; never serialized
    pub cache: Option<Arc<dyn CacheStore>>,
}

impl ParseContext {
    /// Create a context for `file_path`, inferring the file type from its extension
    pub fn new(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        let file_path = file_path.into();
        Self {
            file_type: FileType::from_path(&file_path),
            file_path,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_mod_time(mut self, mod_time: i64) -> Self {
        self.mod_time = mod_time;
        self
    }

    pub fn with_priority(mut self, priority: ParsePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_settings(mut self, settings: ExtractorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Refill a recycled context, reusing its string buffers
    pub fn fill(&mut self, file_path: &str, content: &str, mod_time: i64) {
        self.file_path.clear();
        self.file_path.push_str(file_path);
        self.content.clear();
        self.content.push_str(content);
        self.file_type = FileType::from_path(file_path);
        self.mod_time = mod_time;
    }

    /// Return to the blank state, keeping allocated capacity
    pub fn reset(&mut self) {
        self.file_path.clear();
        self.content.clear();
        self.file_type = FileType::default();
        self.mod_time = 0;
        self.priority = ParsePriority::default();
        self.correlation_id = None;
        self.settings = ExtractorSettings::default();
        self.cache = None;
    }

    /// Reject contexts a plugin cannot work with
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.file_path.trim().is_empty() {
            return Err(ParseError::Validation("file path is missing".to_string()));
        }
        if self.content.contains('\0') {
            return Err(ParseError::Validation(format!("{} has binary content", self.file_path)));
        }
        Ok(())
    }
}

impl fmt::Debug for ParseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseContext")
            .field("file_path", &self.file_path)
            .field("content_len", &self.content.len())
            .field("file_type", &self.file_type)
            .field("mod_time", &self.mod_time)
            .field("priority", &self.priority)
            .field("correlation_id", &self.correlation_id)
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}
