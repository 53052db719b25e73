//! Markdown checkbox plugin.

use async_trait::async_trait;

use super::ParserPlugin;
use crate::context::ParseContext;
use crate::domain::{PluginType, TaskRecord};
use crate::error::ParseError;
use crate::extract::MarkdownTaskExtractor;

/// Runs the markdown extractor over the whole document
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownPlugin {
    extractor: MarkdownTaskExtractor,
}

impl MarkdownPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParserPlugin for MarkdownPlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::Markdown
    }

    async fn parse_internal(&self, ctx: &ParseContext) -> Result<Vec<TaskRecord>, ParseError> {
        Ok(self.extractor.extract(ctx).tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parses_markdown_document() {
        let plugin = MarkdownPlugin::new();
        let ctx = ParseContext::new("todo.md", "# Inbox\n- [ ] one\n- [x] two");
        let tasks = plugin.parse_internal(&ctx).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].id, "todo.md-L2");
        assert_eq!(plugin.plugin_type(), PluginType::Markdown);
        assert!(plugin.fallback_result(&ctx).is_empty());
    }
}
