//! Extractor settings snapshot carried by every parse context.

use serde::{Deserialize, Serialize};

/// Metadata notation a vault is written in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Notation {
    /// Emoji markers: `📅 2024-01-01`, `🔁 every week`, `⏫`
    #[default]
    Emoji,
    /// Inline fields: `[due:: 2024-01-01]`, `[repeat:: every week]`
    Dataview,
}

impl Notation {
    /// The notation tried when the preferred one has no match
    pub fn alternate(&self) -> Self {
        match self {
            Self::Emoji => Self::Dataview,
            Self::Dataview => Self::Emoji,
        }
    }
}

/// Tunables for the markdown task extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractorSettings {
    /// Notation tried first for every metadata field
    pub preferred_notation: Notation,

    /// Keep only tasks under a heading containing one of these
    pub focus_headings: Vec<String>,

    /// Drop tasks under a heading containing one of these (ignored when focus is set)
    pub ignore_headings: Vec<String>,

    /// Tag prefix that assigns a project, e.g. `project/` in `#project/website`
    pub project_tag_prefix: String,

    /// Columns a tab counts for when measuring indentation
    pub tab_width: usize,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            preferred_notation: Notation::Emoji,
            focus_headings: Vec::new(),
            ignore_headings: Vec::new(),
            project_tag_prefix: "project/".to_string(),
            tab_width: 4,
        }
    }
}

impl ExtractorSettings {
    pub fn with_notation(mut self, notation: Notation) -> Self {
        self.preferred_notation = notation;
        self
    }

    pub fn with_focus_headings(mut self, headings: Vec<String>) -> Self {
        self.focus_headings = headings;
        self
    }

    pub fn with_ignore_headings(mut self, headings: Vec<String>) -> Self {
        self.ignore_headings = headings;
        self
    }
}
