//! Flat, reference-free projection of a parse context.
//!
//! Built by explicit field copy so it never needs cycle detection; the
//! receiving side re-attaches its own live handles in `into_context`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{FileType, ParseContext, ParsePriority};
use crate::cache::CacheStore;
use crate::error::{Result, TaskmillError};
use crate::extract::ExtractorSettings;
use crate::id::now_ms;

/// Current wire format version
pub const SERIALIZATION_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedContext {
    pub file_path: String,
    pub content: String,
    pub file_type: FileType,
    pub mod_time: i64,
    pub priority: ParsePriority,
    pub correlation_id: Option<String>,
    pub settings: ExtractorSettings,
    pub serialization_version: u32,
    /// When the projection was taken (Unix ms)
    pub timestamp: i64,
}

impl SerializedContext {
    /// Project a live context, dropping its cache handle
    pub fn from_context(ctx: &ParseContext) -> Self {
        Self {
            file_path: ctx.file_path.clone(),
            content: ctx.content.clone(),
            file_type: ctx.file_type,
            mod_time: ctx.mod_time,
            priority: ctx.priority,
            correlation_id: ctx.correlation_id.clone(),
            settings: ctx.settings.clone(),
            serialization_version: SERIALIZATION_VERSION,
            timestamp: now_ms(),
        }
    }

    /// Rebuild a live context, attaching the receiver's cache handle
    pub fn into_context(self, cache: Option<Arc<dyn CacheStore>>) -> Result<ParseContext> {
        if self.serialization_version != SERIALIZATION_VERSION {
            return Err(TaskmillError::UnsupportedVersion {
                found: self.serialization_version,
                expected: SERIALIZATION_VERSION,
            });
        }
        Ok(ParseContext {
            file_path: self.file_path,
            content: self.content,
            file_type: self.file_type,
            mod_time: self.mod_time,
            priority: self.priority,
            correlation_id: self.correlation_id,
            settings: self.settings,
            cache,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<&ParseContext> for SerializedContext {
    fn from(ctx: &ParseContext) -> Self {
        Self::from_context(ctx)
    }
}
