//! Extraction integration tests
//!
//! Exercises the markdown extractor through pooled contexts, the serialized
//! context projection and the canvas plugin.

use chrono::NaiveDate;
use taskmill::context::{ContextPool, ParseContext, SERIALIZATION_VERSION, SerializedContext};
use taskmill::domain::{ALLOWED_STATUS_CHARS, OnCompletion, PluginType};
use taskmill::error::{Result, TaskmillError};
use taskmill::extract::{ExtractorSettings, MarkdownTaskExtractor, Notation};
use taskmill::plugin::{CanvasPlugin, MarkdownPlugin, ParserPlugin};

const VAULT_NOTE: &str = "\
# Sprint

## Today
- [x] Write report #work 📅 2024-12-31 🔁 every week
- [ ] Review PR [[Team Notes]] ⏫
\t- [/] Leave comments
\t\t- [ ] Approve

## Later
- [-] Migrate wiki [due:: 2025-01-10] #project/website
```
- [ ] inside code
```
* [ ] Call back @phone [onCompletion:: delete]
";

/// Integration test: both documented examples hold end to end
#[test]
fn test_documented_examples() {
    let extractor = MarkdownTaskExtractor::new();

    let ctx = ParseContext::new("daily.md", "- [x] Write report #work 📅 2024-12-31 🔁 every week");
    let out = extractor.extract(&ctx);
    let task = &out.tasks[0];
    assert!(task.completed);
    assert_eq!(task.metadata.tags, vec!["#work"]);
    assert_eq!(task.metadata.due_date, NaiveDate::from_ymd_opt(2024, 12, 31));
    assert_eq!(task.metadata.recurrence.as_deref(), Some("every week"));
    assert_eq!(task.content, "Write report");

    let ctx = ParseContext::new("daily.md", "- [ ] Parent\n  - [ ] Child");
    let out = extractor.extract(&ctx);
    assert_eq!(out.tasks[1].metadata.parent_id.as_deref(), Some(out.tasks[0].id.as_str()));
}

/// Integration test: a realistic note with headings, nesting and mixed notations
#[test]
fn test_vault_note() {
    let ctx = ParseContext::new("sprint.md", VAULT_NOTE);
    let out = MarkdownTaskExtractor::new().extract(&ctx);

    let contents: Vec<&str> = out.tasks.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "Write report",
            "Review PR [[Team Notes]]",
            "Leave comments",
            "Approve",
            "Migrate wiki",
            "Call back",
        ]
    );

    let review = &out.tasks[1];
    let comments = &out.tasks[2];
    let approve = &out.tasks[3];
    assert_eq!(comments.metadata.parent_id.as_deref(), Some(review.id.as_str()));
    assert_eq!(approve.metadata.parent_id.as_deref(), Some(comments.id.as_str()));
    assert_eq!(review.metadata.children_ids, vec![comments.id.clone()]);
    assert_eq!(review.metadata.heading_path, vec!["Sprint", "Today"]);
    assert!(review.metadata.priority.is_some());

    let wiki = &out.tasks[4];
    assert_eq!(wiki.status, '-');
    assert!(!wiki.completed);
    assert_eq!(wiki.metadata.due_date, NaiveDate::from_ymd_opt(2025, 1, 10));
    assert_eq!(wiki.metadata.project.as_deref(), Some("website"));
    assert_eq!(wiki.metadata.heading_path, vec!["Sprint", "Later"]);

    let call = &out.tasks[5];
    assert_eq!(call.metadata.context.as_deref(), Some("phone"));
    assert_eq!(call.metadata.on_completion, Some(OnCompletion::Action("delete".to_string())));
    assert_eq!(call.line_number, 13);
}

/// Integration test: completed is true exactly for x/X across every allowed status
#[test]
fn test_completion_property() {
    let doc: String = ALLOWED_STATUS_CHARS
        .iter()
        .map(|c| format!("- [{}] task {}\n", c, c))
        .collect();
    let out = MarkdownTaskExtractor::new().extract(&ParseContext::new("status.md", doc));

    assert_eq!(out.tasks.len(), ALLOWED_STATUS_CHARS.len());
    for task in &out.tasks {
        assert_eq!(task.completed, task.status == 'x' || task.status == 'X', "status {:?}", task.status);
    }
}

/// Integration test: reusing pooled contexts gives the same tasks as fresh ones
#[test]
fn test_pool_reuse_is_idempotent() {
    let pool = ContextPool::new(2);
    let extractor = MarkdownTaskExtractor::new();
    let docs = [("a.md", VAULT_NOTE), ("b.md", "- [ ] other #tag"), ("a.md", VAULT_NOTE)];

    let mut outputs = Vec::new();
    for (path, content) in docs {
        let ctx = pool.acquire_for(path, content, 1_700_000_000_000);
        outputs.push(extractor.extract(&ctx).tasks);
        pool.release(ctx);
    }

    let fresh = extractor.extract(&ParseContext::new("a.md", VAULT_NOTE).with_mod_time(1_700_000_000_000));
    assert_eq!(outputs[0], fresh.tasks);
    assert_eq!(outputs[2], fresh.tasks);
    assert!(pool.reused() >= 2);
    assert!(pool.available() <= pool.capacity());
}

/// Integration test: settings travel through the serialized projection
#[test]
fn test_serialized_context_preserves_settings() -> Result<()> {
    let settings = ExtractorSettings::default()
        .with_notation(Notation::Dataview)
        .with_focus_headings(vec!["Later".to_string()]);
    let ctx = ParseContext::new("sprint.md", VAULT_NOTE)
        .with_mod_time(42)
        .with_correlation_id("req-1")
        .with_settings(settings);

    let json = SerializedContext::from_context(&ctx).to_json()?;
    let restored = SerializedContext::from_json(&json)?.into_context(None)?;

    assert_eq!(restored.correlation_id.as_deref(), Some("req-1"));
    assert_eq!(restored.mod_time, 42);

    let extractor = MarkdownTaskExtractor::new();
    let before = extractor.extract(&ctx).tasks;
    let after = extractor.extract(&restored).tasks;
    assert_eq!(before, after);
    let contents: Vec<&str> = after.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["Migrate wiki", "Call back"]);
    Ok(())
}

/// Integration test: projections from a future format are refused
#[test]
fn test_serialized_context_version_check() -> Result<()> {
    let mut wire = SerializedContext::from_context(&ParseContext::new("a.md", "- [ ] a"));
    wire.serialization_version = SERIALIZATION_VERSION + 1;
    let err = wire.into_context(None).unwrap_err();
    assert!(matches!(err, TaskmillError::UnsupportedVersion { .. }));
    Ok(())
}

/// Integration test: the canvas plugin extracts from text nodes with unique ids
#[tokio::test]
async fn test_canvas_plugin_text_nodes() {
    let canvas = r#"{
        "nodes": [
            {"id": "n1", "type": "text", "text": "- [ ] Draft outline\n  - [x] Pick title"},
            {"id": "n2", "type": "file", "file": "other.md"},
            {"id": "n3", "type": "text", "text": "- [ ] Draft outline"}
        ],
        "edges": []
    }"#;
    let plugin = CanvasPlugin::new();
    assert_eq!(plugin.plugin_type(), PluginType::Canvas);

    let tasks = plugin.parse_internal(&ParseContext::new("board.canvas", canvas)).await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[1].metadata.parent_id.as_deref(), Some(tasks[0].id.as_str()));
    assert_ne!(tasks[0].id, tasks[2].id);
    assert!(tasks.iter().all(|t| t.id.starts_with("board.canvas#")));
}

/// Integration test: markdown plugin and extractor agree
#[tokio::test]
async fn test_markdown_plugin_matches_extractor() {
    let ctx = ParseContext::new("sprint.md", VAULT_NOTE);
    let via_plugin = MarkdownPlugin::new().parse_internal(&ctx).await.unwrap();
    let direct = MarkdownTaskExtractor::new().extract(&ctx).tasks;
    assert_eq!(via_plugin, direct);
}
