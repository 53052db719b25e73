//! Line classification: checkboxes, headings and code fences.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::is_allowed_status;

/// A checkbox line split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckboxLine<'a> {
    /// Leading whitespace width with tabs expanded
    pub indent: usize,
    pub status: char,
    /// Everything after the closing bracket, untrimmed of metadata
    pub body: &'a str,
}

/// An ATX heading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading<'a> {
    pub level: usize,
    pub text: &'a str,
}

fn checkbox_pattern() -> &'static Regex {
    static CHECKBOX: OnceLock<Regex> = OnceLock::new();
    CHECKBOX.get_or_init(|| {
        Regex::new(r"^(?:[ \t]*>)*([ \t]*)(?:[-*+]|\d+[.)])[ \t]+\[(.)\](?:[ \t]+(.*))?$")
            .expect("checkbox pattern is valid")
    })
}

fn heading_pattern() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| Regex::new(r"^(#{1,6})[ \t]+(.*?)(?:[ \t]+#+)?[ \t]*$").expect("heading pattern is valid"))
}

/// Width of leading whitespace, with tabs advancing to the next tab stop
pub fn indent_width(whitespace: &str, tab_width: usize) -> usize {
    let tab_width = tab_width.max(1);
    whitespace.chars().fold(0, |col, c| match c {
        '\t' => (col / tab_width + 1) * tab_width,
        _ => col + 1,
    })
}

/// Parse a checkbox task line. Returns None for plain list items and for
/// status characters outside the accepted set.
pub fn parse_checkbox(line: &str, tab_width: usize) -> Option<CheckboxLine<'_>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let caps = checkbox_pattern().captures(line)?;
    let status = caps.get(2)?.as_str().chars().next()?;
    if !is_allowed_status(status) {
        return None;
    }
    Some(CheckboxLine {
        indent: indent_width(caps.get(1).map_or("", |m| m.as_str()), tab_width),
        status,
        body: caps.get(3).map_or("", |m| m.as_str()),
    })
}

pub fn parse_heading(line: &str) -> Option<Heading<'_>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let caps = heading_pattern().captures(line)?;
    Some(Heading {
        level: caps.get(1)?.len(),
        text: caps.get(2).map_or("", |m| m.as_str()),
    })
}

/// A code fence: a run of at least three backticks or tildes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence {
    pub marker: char,
    pub len: usize,
}

impl Fence {
    /// A fence only closes on the same marker, at least as long, with nothing after it
    pub fn is_closed_by(&self, line: &str) -> bool {
        parse_fence(line).is_some_and(|close| {
            close.marker == self.marker && close.len >= self.len && line.trim()[close.len..].is_empty()
        })
    }
}

/// Parse a line that could open a fenced code block
pub fn parse_fence(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    (len >= 3).then_some(Fence { marker, len })
}
