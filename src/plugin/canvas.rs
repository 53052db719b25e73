//! JSON canvas plugin.
//!
//! A canvas is a board of nodes; text nodes hold markdown. Each text node is
//! extracted on its own, with task ids prefixed by the node id so two nodes
//! that both have a task on line 0 stay distinct.

use async_trait::async_trait;
use serde::Deserialize;

use super::ParserPlugin;
use crate::context::ParseContext;
use crate::domain::{PluginType, TaskRecord};
use crate::error::ParseError;
use crate::extract::extract_tasks;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CanvasDocument {
    nodes: Vec<CanvasNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CanvasNode {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CanvasPlugin;

impl CanvasPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ParserPlugin for CanvasPlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::Canvas
    }

    async fn parse_internal(&self, ctx: &ParseContext) -> Result<Vec<TaskRecord>, ParseError> {
        if ctx.content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let doc: CanvasDocument = serde_json::from_str(&ctx.content)
            .map_err(|e| ParseError::fatal(format!("{} is not a valid canvas: {}", ctx.file_path, e)))?;

        let mut tasks = Vec::new();
        for node in doc.nodes.iter().filter(|n| n.kind == "text") {
            let Some(text) = node.text.as_deref() else { continue };
            let prefix = format!("{}#{}", ctx.file_path, node.id);
            tasks.extend(extract_tasks(&prefix, text, &ctx.settings).tasks);
        }
        Ok(tasks)
    }
}
