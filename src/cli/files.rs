//! Turning command-line path arguments into document files.

use eyre::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Extensions picked up when a directory is given
const DOCUMENT_EXTENSIONS: [&str; 3] = ["md", "markdown", "canvas"];

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand files, directories and glob patterns into a sorted, deduplicated file list.
/// Plain paths are kept even if missing so the read error names them.
pub fn expand_paths(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_dir() {
            for ext in DOCUMENT_EXTENSIONS {
                let nested = path.join("**").join(format!("*.{}", ext));
                files.extend(glob_files(&nested.to_string_lossy())?);
            }
        } else if is_glob(pattern) {
            files.extend(glob_files(pattern)?);
        } else {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn glob_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
    Ok(entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect())
}

/// Modification time in ms since the epoch, 0 when unavailable
pub fn mod_time_ms(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis() as i64)
}
