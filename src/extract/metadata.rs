//! Metadata extraction pipeline.
//!
//! Stages run in a fixed order over progressively stripped task text: dates,
//! recurrence, priority, project, context, on-completion, depends-on, id, and
//! finally tags. Each stage removes what it consumed so later stages never see
//! it. Tags run last over a masked copy where links and inline code are blanked
//! out with equal-length padding, so offsets still line up with the real text.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use super::notation::{DateField, EMOJI_MARKERS, NotationPatterns, patterns, priority_value};
use super::settings::{ExtractorSettings, Notation};
use crate::domain::{OnCompletion, TaskMetadata};

/// Run the full pipeline over a task body. Returns the cleaned content and its metadata.
pub fn extract_metadata(body: &str, settings: &ExtractorSettings) -> (String, TaskMetadata) {
    let mut meta = TaskMetadata::default();
    let mut rest = body.to_string();
    let order = [settings.preferred_notation, settings.preferred_notation.alternate()];

    for field in DateField::PIPELINE_ORDER {
        let date = take_field(&mut rest, order, |p| Some(p.date(field)), parse_date);
        match field {
            DateField::Due => meta.due_date = date,
            DateField::Scheduled => meta.scheduled_date = date,
            DateField::Start => meta.start_date = date,
            DateField::Completed => meta.completed_date = date,
            DateField::Created => meta.created_date = date,
            DateField::Cancelled => meta.cancelled_date = date,
        }
    }

    meta.recurrence = take_field(&mut rest, order, |p| Some(&p.recurrence), non_empty);
    meta.priority = take_field(&mut rest, order, |p| Some(&p.priority), priority_value);
    meta.project = take_field(&mut rest, order, |p| p.project.as_ref(), non_empty);
    meta.context = take_field(&mut rest, order, |p| Some(&p.context), non_empty);
    meta.on_completion = order.iter().find_map(|n| take_on_completion(&mut rest, *n));
    meta.depends_on = take_field(&mut rest, order, |p| Some(&p.depends_on), parse_id_list).unwrap_or_default();
    meta.stable_id = take_field(&mut rest, order, |p| Some(&p.stable_id), non_empty);

    take_tags(&mut rest, &mut meta, &settings.project_tag_prefix);

    let content = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    (content, meta)
}

/// Try each notation in order; the first whose pattern matches and parses wins
fn take_field<T, S, P>(text: &mut String, order: [Notation; 2], select: S, parse: P) -> Option<T>
where
    S: Fn(&NotationPatterns) -> Option<&Regex>,
    P: Fn(&str) -> Option<T>,
{
    order
        .iter()
        .find_map(|n| select(patterns(*n)).and_then(|re| take_match(text, re, &parse)))
}

/// Remove the first match of `re` whose capture parses, returning the parsed value
fn take_match<T>(text: &mut String, re: &Regex, parse: &impl Fn(&str) -> Option<T>) -> Option<T> {
    let (range, value) = {
        let caps = re.captures(text)?;
        let whole = caps.get(0)?;
        let value = parse(caps.get(1).map_or("", |m| m.as_str()))?;
        (whole.range(), value)
    };
    text.replace_range(range, " ");
    Some(value)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_id_list(raw: &str) -> Option<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    (!ids.is_empty()).then_some(ids)
}

/// On-completion values may be structured JSON, so the span is found by
/// bracket balancing instead of a regex.
fn take_on_completion(text: &mut String, notation: Notation) -> Option<OnCompletion> {
    let marker = patterns(notation).on_completion_marker;
    let start = match notation {
        // Inline field keys are case-insensitive; ASCII lowercasing keeps byte offsets
        Notation::Dataview => text.to_ascii_lowercase().find(&marker.to_ascii_lowercase())?,
        Notation::Emoji => text.find(marker)?,
    };

    let mut pos = start + marker.len();
    pos += text[pos..].strip_prefix('\u{FE0F}').map_or(0, |_| '\u{FE0F}'.len_utf8());
    pos += text[pos..].len() - text[pos..].trim_start().len();

    let (raw, end) = match notation {
        Notation::Emoji => {
            if text[pos..].starts_with('{') {
                let end = balanced_end(text, pos)?;
                (text[pos..end].to_string(), end)
            } else {
                let len = text[pos..]
                    .find(|c: char| c.is_whitespace() || EMOJI_MARKERS.contains(c))
                    .unwrap_or(text.len() - pos);
                (text[pos..pos + len].to_string(), pos + len)
            }
        }
        Notation::Dataview => {
            let value_end = if text[pos..].starts_with('{') || text[pos..].starts_with('[') {
                balanced_end(text, pos)?
            } else {
                pos + text[pos..].find(']')?
            };
            let close = value_end + text[value_end..].find(']')?;
            (text[pos..value_end].to_string(), close + 1)
        }
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let value = if raw.starts_with('{') {
        serde_json::from_str(raw)
            .map(OnCompletion::Structured)
            .unwrap_or_else(|_| OnCompletion::Action(raw.to_string()))
    } else {
        OnCompletion::Action(raw.to_string())
    };
    text.replace_range(start..end, " ");
    Some(value)
}

/// Byte index just past the bracket that closes the one at `start`
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn mask_pattern() -> &'static Regex {
    static MASK: OnceLock<Regex> = OnceLock::new();
    MASK.get_or_init(|| {
        Regex::new(r"\[\[[^\]]*\]\]|\[[^\]]*\]\([^)]*\)|`[^`]*`|https?://\S+").expect("mask pattern is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"(?:^|\s)(#[\p{L}\p{N}_/\-]+)").expect("tag pattern is valid"))
}

/// Replace links and inline code with spaces of the same byte length
pub fn mask_links_and_code(text: &str) -> String {
    let mut masked = text.to_string();
    for m in mask_pattern().find_iter(text) {
        masked.replace_range(m.range(), &" ".repeat(m.len()));
    }
    masked
}

fn take_tags(text: &mut String, meta: &mut TaskMetadata, project_prefix: &str) {
    let masked = mask_links_and_code(text);
    let mut ranges = Vec::new();
    for caps in tag_pattern().captures_iter(&masked) {
        let Some(tag) = caps.get(1) else { continue };
        let name = &tag.as_str()[1..];
        if name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        ranges.push(tag.range());
        meta.add_tag(tag.as_str().to_string());

        if meta.project.is_none()
            && !project_prefix.is_empty()
            && let Some(project) = name.strip_prefix(project_prefix)
            && !project.is_empty()
        {
            meta.project = Some(project.to_string());
        }
    }
    for range in ranges.into_iter().rev() {
        text.replace_range(range, " ");
    }
}
