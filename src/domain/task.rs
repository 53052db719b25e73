//! Task record and metadata types
//!
//! A `TaskRecord` is one checkbox line plus everything the metadata pipeline
//! derived from it. Records are produced fresh on every parse pass; a new
//! generation replaces the previous one for the same document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Status characters a checkbox may carry
pub const ALLOWED_STATUS_CHARS: [char; 10] = ['x', 'X', ' ', '/', '-', '>', '<', '?', '!', '*'];

/// Returns true if `c` is an accepted checkbox status character
pub fn is_allowed_status(c: char) -> bool {
    ALLOWED_STATUS_CHARS.contains(&c)
}

/// Returns true if `c` marks the task as completed
pub fn is_completion_marker(c: char) -> bool {
    matches!(c, 'x' | 'X')
}

/// A structured task extracted from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Stable identifier derived from file path and line (`path-L12`)
    pub id: String,

    /// Task text with all metadata markers stripped
    pub content: String,

    /// Raw status character between the brackets
    pub status: char,

    /// Derived from `status`; true only for `x` / `X`
    pub completed: bool,

    /// The full source line, untouched
    pub original_text: String,

    /// Zero-based line index within the document
    pub line_number: usize,

    pub metadata: TaskMetadata,
}

impl TaskRecord {
    /// Create a record with empty metadata; `completed` is derived from `status`.
    pub fn new(id: String, status: char, content: String, original_text: String, line_number: usize) -> Self {
        Self {
            id,
            content,
            status,
            completed: is_completion_marker(status),
            original_text,
            line_number,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.metadata.parent_id.is_none()
    }

    /// Rough heap footprint of the record in bytes
    pub fn memory_estimate(&self) -> usize {
        let m = &self.metadata;
        let strings = self.id.len()
            + self.content.len()
            + self.original_text.len()
            + m.tags.iter().map(String::len).sum::<usize>()
            + m.recurrence.as_ref().map_or(0, String::len)
            + m.project.as_ref().map_or(0, String::len)
            + m.context.as_ref().map_or(0, String::len)
            + m.depends_on.iter().map(String::len).sum::<usize>()
            + m.stable_id.as_ref().map_or(0, String::len)
            + m.heading_path.iter().map(String::len).sum::<usize>()
            + m.parent_id.as_ref().map_or(0, String::len)
            + m.children_ids.iter().map(String::len).sum::<usize>();
        std::mem::size_of::<Self>() + strings
    }
}

/// Action to perform when a task is completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnCompletion {
    /// Bare action keyword, e.g. `delete` or `archive`
    Action(String),
    /// Structured payload, e.g. `{"type":"move","target":"done.md"}`
    Structured(serde_json::Value),
}

/// Metadata attached to a task record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    /// Tags including the leading `#`, in first-seen order without duplicates
    pub tags: Vec<String>,

    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub scheduled_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    pub created_date: Option<NaiveDate>,
    pub cancelled_date: Option<NaiveDate>,

    /// 1 (lowest) to 5 (highest)
    pub priority: Option<u8>,

    /// Recurrence rule text, e.g. `every week`
    pub recurrence: Option<String>,

    pub project: Option<String>,
    pub context: Option<String>,
    pub on_completion: Option<OnCompletion>,

    /// Ids of tasks this one waits on, in declaration order
    pub depends_on: Vec<String>,

    /// User-assigned id that survives line moves
    pub stable_id: Option<String>,

    /// Headings enclosing the task, outermost first
    pub heading_path: Vec<String>,

    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
}

impl TaskMetadata {
    /// Add a tag unless already present
    pub fn add_tag(&mut self, tag: String) {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }
}
