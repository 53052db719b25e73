//! Terminal and JSON output for parse results.

use colored::*;
use serde::Serialize;
use std::collections::HashMap;

use taskmill::domain::{ParseResult, TaskRecord};

/// One parsed file, as printed with `--json`
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: String,
    pub result: ParseResult,
}

/// Nesting depth of every task, following parent links
pub fn task_depths(tasks: &[TaskRecord]) -> HashMap<&str, usize> {
    let parents: HashMap<&str, &str> = tasks
        .iter()
        .filter_map(|t| t.metadata.parent_id.as_deref().map(|p| (t.id.as_str(), p)))
        .collect();

    tasks
        .iter()
        .map(|t| {
            let mut depth = 0;
            let mut current = t.id.as_str();
            while let Some(parent) = parents.get(current) {
                depth += 1;
                current = parent;
                if depth > tasks.len() {
                    break;
                }
            }
            (t.id.as_str(), depth)
        })
        .collect()
}

/// Plain one-line summary of a task
pub fn format_task(task: &TaskRecord, depth: usize) -> String {
    let mut line = format!("{}[{}] {}", "  ".repeat(depth), task.status, task.content);
    let m = &task.metadata;
    if let Some(due) = m.due_date {
        line.push_str(&format!(" (due {})", due));
    }
    if let Some(priority) = m.priority {
        line.push_str(&format!(" !{}", priority));
    }
    if let Some(project) = &m.project {
        line.push_str(&format!(" @{}", project));
    }
    if !m.tags.is_empty() {
        line.push(' ');
        line.push_str(&m.tags.join(" "));
    }
    line
}

pub fn print_report(report: &FileReport) {
    match &report.result {
        ParseResult::Success { data, source, .. } => {
            let origin = if source.from_cache { " (cached)" } else { "" };
            println!(
                "{} {} {}{}",
                "✓".green(),
                report.path.bold(),
                format!("{} tasks via {}", data.len(), source.plugin_type).dimmed(),
                origin.dimmed()
            );
            let depths = task_depths(data);
            for task in data {
                let depth = depths.get(task.id.as_str()).copied().unwrap_or(0);
                let line = format!("  {}", format_task(task, depth));
                if task.completed {
                    println!("{}", line.green());
                } else {
                    println!("{}", line);
                }
            }
        }
        ParseResult::Error { message, code, .. } => {
            println!("{} {} {} {}", "✗".red(), report.path.bold(), code.as_str().red(), message);
        }
    }
}

pub fn print_json(reports: &[FileReport]) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(reports)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmill::extract::{ExtractorSettings, extract_tasks};

    #[test]
    fn test_depths_follow_parents() {
        let content = "- [ ] Parent\n  - [ ] Child\n    - [ ] Grandchild\n- [ ] Sibling\n";
        let output = extract_tasks("doc.md", content, &ExtractorSettings::default());
        let depths = task_depths(&output.tasks);
        let by_content: Vec<(String, usize)> = output
            .tasks
            .iter()
            .map(|t| (t.content.clone(), depths[t.id.as_str()]))
            .collect();
        assert_eq!(
            by_content,
            vec![
                ("Parent".to_string(), 0),
                ("Child".to_string(), 1),
                ("Grandchild".to_string(), 2),
                ("Sibling".to_string(), 0),
            ]
        );
    }

    #[test]
    fn test_format_task_with_metadata() {
        let content = "- [x] Write report #work 📅 2024-01-15 ⏫\n";
        let output = extract_tasks("doc.md", content, &ExtractorSettings::default());
        let line = format_task(&output.tasks[0], 1);
        assert!(line.starts_with("  [x] Write report"));
        assert!(line.contains("(due 2024-01-15)"));
        assert!(line.contains("#work"));
    }
}
