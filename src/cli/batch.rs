//! Feeding document files to the plugin manager.

use eyre::{Context, Result};
use futures::stream::{self, StreamExt};
use log::warn;
use std::path::{Path, PathBuf};

use super::files::mod_time_ms;
use super::render::FileReport;
use taskmill::config::GlobalConfig;
use taskmill::context::{ParseContext, ParsePriority};
use taskmill::domain::{ParseResult, PluginType};
use taskmill::error::ParseError;
use taskmill::scheduler::{PluginManager, SubmitOptions};

/// Parse every file, in input order. At most `max-queue-size` parses wait on
/// the manager at once so large vaults never overflow its queue.
pub async fn parse_files(
    manager: &PluginManager,
    files: &[PathBuf],
    plugin: Option<PluginType>,
    priority: ParsePriority,
    config: &GlobalConfig,
) -> Vec<FileReport> {
    let in_flight = config.scheduler.max_queue_size.max(1);
    stream::iter(files)
        .map(|path| parse_file(manager, path, plugin, priority, config))
        .buffered(in_flight)
        .collect()
        .await
}

async fn parse_file(
    manager: &PluginManager,
    path: &Path,
    plugin: Option<PluginType>,
    priority: ParsePriority,
    config: &GlobalConfig,
) -> FileReport {
    let display = path.display().to_string();
    let result = match read_and_submit(manager, path, plugin, priority, config).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Failed to parse {}: {:#}", display, e);
            ParseResult::from_error(&ParseError::Validation(format!("{:#}", e)))
        }
    };
    FileReport { path: display, result }
}

async fn read_and_submit(
    manager: &PluginManager,
    path: &Path,
    plugin: Option<PluginType>,
    priority: ParsePriority,
    config: &GlobalConfig,
) -> Result<ParseResult> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let metadata = tokio::fs::metadata(path).await?;

    let plugin_type = plugin.unwrap_or_else(|| {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(PluginType::Markdown, PluginType::for_extension)
    });

    let ctx = ParseContext::new(path.display().to_string(), content)
        .with_mod_time(mod_time_ms(&metadata))
        .with_priority(priority)
        .with_settings(config.extractor.clone());

    let handle = manager
        .submit_with(ctx, plugin_type, SubmitOptions::default().with_priority(priority))
        .await?;
    Ok(handle.result().await)
}
