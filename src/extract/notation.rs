//! Marker tables and compiled patterns for both metadata notations.

use std::sync::OnceLock;

use regex::Regex;

use super::settings::Notation;

/// Every emoji that starts a metadata field; free-text values stop at these
pub const EMOJI_MARKERS: &str = "📅⏳🛫✅➕❌🔁🏁⛔🆔🔺⏫🔼🔽⏬";

/// Date fields in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Due,
    Scheduled,
    Start,
    Completed,
    Created,
    Cancelled,
}

impl DateField {
    pub const PIPELINE_ORDER: [DateField; 6] = [
        DateField::Due,
        DateField::Scheduled,
        DateField::Start,
        DateField::Completed,
        DateField::Created,
        DateField::Cancelled,
    ];

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Due => "📅",
            Self::Scheduled => "⏳",
            Self::Start => "🛫",
            Self::Completed => "✅",
            Self::Created => "➕",
            Self::Cancelled => "❌",
        }
    }

    pub fn dataview_key(&self) -> &'static str {
        match self {
            Self::Due => "due",
            Self::Scheduled => "scheduled",
            Self::Start => "start",
            Self::Completed => "completion",
            Self::Created => "created",
            Self::Cancelled => "cancelled",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Due => 0,
            Self::Scheduled => 1,
            Self::Start => 2,
            Self::Completed => 3,
            Self::Created => 4,
            Self::Cancelled => 5,
        }
    }
}

/// Emoji priority symbols, highest first
pub const PRIORITY_SYMBOLS: [(&str, u8); 5] = [("🔺", 5), ("⏫", 4), ("🔼", 3), ("🔽", 2), ("⏬", 1)];

/// Map a priority symbol or word to 1..=5
pub fn priority_value(raw: &str) -> Option<u8> {
    let raw = raw.trim();
    if let Some((_, v)) = PRIORITY_SYMBOLS.iter().find(|(s, _)| raw.starts_with(s)) {
        return Some(*v);
    }
    match raw.to_ascii_lowercase().as_str() {
        "highest" => Some(5),
        "high" => Some(4),
        "medium" => Some(3),
        "low" => Some(2),
        "lowest" => Some(1),
        other => other.parse::<u8>().ok().filter(|n| (1..=5).contains(n)),
    }
}

/// Compiled patterns for one notation
pub struct NotationPatterns {
    dates: [Regex; 6],
    pub recurrence: Regex,
    pub priority: Regex,
    pub project: Option<Regex>,
    pub context: Regex,
    pub depends_on: Regex,
    pub stable_id: Regex,
    /// Literal that opens an on-completion value
    pub on_completion_marker: &'static str,
}

impl NotationPatterns {
    pub fn date(&self, field: DateField) -> &Regex {
        &self.dates[field.index()]
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("notation pattern is valid")
}

fn emoji_date(field: DateField) -> Regex {
    compile(&format!(r"{}\x{{FE0F}}?\s*(\d{{4}}-\d{{2}}-\d{{2}})", regex::escape(field.emoji())))
}

fn dataview_field(key: &str) -> Regex {
    compile(&format!(r"(?i)\[{}::\s*([^\]]*?)\s*\]", key))
}

fn emoji_patterns() -> NotationPatterns {
    NotationPatterns {
        dates: DateField::PIPELINE_ORDER.map(emoji_date),
        recurrence: compile(&format!(r"🔁\x{{FE0F}}?\s*([^{}#@\[\]]+)", EMOJI_MARKERS)),
        priority: compile(r"(🔺|⏫|🔼|🔽|⏬)\x{FE0F}?"),
        project: None,
        context: compile(r"(?:^|\s)@([\p{L}\p{N}_/\-]+)"),
        depends_on: compile(r"⛔\x{FE0F}?\s*([\w\-]+(?:\s*,\s*[\w\-]+)*)"),
        stable_id: compile(r"🆔\x{FE0F}?\s*([\w\-]+)"),
        on_completion_marker: "🏁",
    }
}

fn dataview_patterns() -> NotationPatterns {
    NotationPatterns {
        dates: DateField::PIPELINE_ORDER.map(|f| dataview_field(f.dataview_key())),
        recurrence: compile(r"(?i)\[(?:repeat|recurrence)::\s*([^\]]*?)\s*\]"),
        priority: dataview_field("priority"),
        project: Some(dataview_field("project")),
        context: dataview_field("context"),
        depends_on: dataview_field("dependsOn"),
        stable_id: dataview_field("id"),
        on_completion_marker: "[onCompletion::",
    }
}

/// Patterns for a notation, compiled on first use
pub fn patterns(notation: Notation) -> &'static NotationPatterns {
    static EMOJI: OnceLock<NotationPatterns> = OnceLock::new();
    static DATAVIEW: OnceLock<NotationPatterns> = OnceLock::new();
    match notation {
        Notation::Emoji => EMOJI.get_or_init(emoji_patterns),
        Notation::Dataview => DATAVIEW.get_or_init(dataview_patterns),
    }
}
