//! Plugin type identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaskmillError;

/// Selects which extraction strategy handles a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Line-oriented markdown checkbox extraction
    Markdown,
    /// JSON canvas documents whose text nodes hold markdown
    Canvas,
    /// Frontmatter/file-level metadata tasks
    Metadata,
    /// Calendar (ICS) event feeds
    Ics,
    /// Project-scoped documents
    Project,
}

impl PluginType {
    pub const ALL: [PluginType; 5] = [
        PluginType::Markdown,
        PluginType::Canvas,
        PluginType::Metadata,
        PluginType::Ics,
        PluginType::Project,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Canvas => "canvas",
            Self::Metadata => "metadata",
            Self::Ics => "ics",
            Self::Project => "project",
        }
    }

    /// Pick a plugin type from a file extension, defaulting to markdown
    pub fn for_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "canvas" => Self::Canvas,
            "ics" => Self::Ics,
            _ => Self::Markdown,
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = TaskmillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TaskmillError::PluginNotRegistered(s.to_string()))
    }
}
