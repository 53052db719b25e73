//! Markdown task extraction.
//!
//! Turns raw document text into `TaskRecord`s: checkbox lines are classified,
//! run through the metadata pipeline, tagged with their heading path, filtered
//! by heading focus/ignore lists, and finally linked into a parent/child forest
//! by indentation. Extraction never fails; malformed lines are simply not tasks.

mod hierarchy;
mod line;
mod metadata;
mod notation;
mod settings;

use std::time::Instant;

use tracing::debug;

use crate::context::ParseContext;
use crate::domain::TaskRecord;
use crate::id::task_id;

pub use hierarchy::build_hierarchy;
pub use line::{CheckboxLine, Fence, Heading, indent_width, parse_checkbox, parse_fence, parse_heading};
pub use metadata::{extract_metadata, mask_links_and_code};
pub use notation::{DateField, PRIORITY_SYMBOLS, priority_value};
pub use settings::{ExtractorSettings, Notation};

/// Counters for one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub total_lines: usize,
    /// Checkbox lines recognized, before heading filters
    pub task_lines: usize,
    /// Tasks dropped by focus/ignore heading filters
    pub filtered_out: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    /// Tasks in line order
    pub tasks: Vec<TaskRecord>,
    pub stats: ExtractionStats,
}

/// Stateless extractor; all tunables come from the context's settings
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownTaskExtractor;

impl MarkdownTaskExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, ctx: &ParseContext) -> ExtractionOutput {
        extract_tasks(&ctx.file_path, &ctx.content, &ctx.settings)
    }
}

/// Extract tasks from `content`, using `id_prefix` for task ids
pub fn extract_tasks(id_prefix: &str, content: &str, settings: &ExtractorSettings) -> ExtractionOutput {
    let start = Instant::now();
    let mut stats = ExtractionStats::default();
    let mut headings: Vec<(usize, String)> = Vec::new();
    let mut open_fence: Option<Fence> = None;
    let mut found: Vec<(TaskRecord, usize)> = Vec::new();

    for (line_number, raw) in content.lines().enumerate() {
        stats.total_lines += 1;

        if let Some(fence) = open_fence {
            if fence.is_closed_by(raw) {
                open_fence = None;
            }
            continue;
        }
        if let Some(fence) = parse_fence(raw) {
            open_fence = Some(fence);
            continue;
        }

        if let Some(heading) = parse_heading(raw) {
            while headings.last().is_some_and(|(level, _)| *level >= heading.level) {
                headings.pop();
            }
            headings.push((heading.level, heading.text.trim().to_string()));
            continue;
        }

        let Some(checkbox) = parse_checkbox(raw, settings.tab_width) else {
            continue;
        };
        stats.task_lines += 1;

        let heading_path: Vec<String> = headings.iter().map(|(_, text)| text.clone()).collect();
        if !passes_heading_filters(&heading_path, settings) {
            stats.filtered_out += 1;
            continue;
        }

        let (text, mut meta) = extract_metadata(checkbox.body, settings);
        meta.heading_path = heading_path;

        let mut task = TaskRecord::new(
            task_id(id_prefix, line_number),
            checkbox.status,
            text,
            raw.trim_end_matches('\r').to_string(),
            line_number,
        );
        task.metadata = meta;
        found.push((task, checkbox.indent));
    }

    // Lines are visited in order already; sort keeps the hierarchy contract explicit
    found.sort_by_key(|(task, _)| task.line_number);
    build_hierarchy(&mut found);

    stats.processing_time_ms = start.elapsed().as_millis() as u64;
    debug!(
        path = %id_prefix,
        tasks = found.len(),
        lines = stats.total_lines,
        filtered = stats.filtered_out,
        "extraction finished"
    );

    ExtractionOutput {
        tasks: found.into_iter().map(|(task, _)| task).collect(),
        stats,
    }
}

/// Focus wins over ignore: with a focus list set the ignore list is not consulted
fn passes_heading_filters(heading_path: &[String], settings: &ExtractorSettings) -> bool {
    let any_contains = |needles: &[String]| {
        heading_path
            .iter()
            .any(|heading| needles.iter().any(|needle| heading.contains(needle.as_str())))
    };
    if !settings.focus_headings.is_empty() {
        return any_contains(&settings.focus_headings);
    }
    if !settings.ignore_headings.is_empty() {
        return !any_contains(&settings.ignore_headings);
    }
    true
}
