//! In-workspace substring search with context (C6, §4.6).

use serde::Serialize;

use super::await_init;
use super::reject;
use super::resolve_in_workspace;
use crate::config::ToolConfiguration;

const MAX_FILE_SIZE: usize = 1024 * 1024;
const DEFAULT_CONTEXT_LINES: usize = 3;
const DEFAULT_MAX_RESULTS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub line_number: usize,
    pub line_content: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSearchResult {
    pub success: bool,
    pub file_path: String,
    pub pattern: String,
    pub matches: Vec<Match>,
    pub total_matches: usize,
    pub file_size: u64,
}

pub async fn file_search(
    config: &ToolConfiguration,
    path: &str,
    pattern: &str,
    context_lines: Option<usize>,
    max_results: Option<usize>,
) -> Result<FileSearchResult, String> {
    await_init(config).await;

    let cwd = config.cwd.to_string_lossy().to_string();
    let resolved = resolve_in_workspace(config.runtime.as_ref(), &cwd, path)?;

    let stat = config
        .runtime
        .stat(&resolved)
        .await
        .map_err(|e| e.to_string())?;
    if stat.is_directory {
        return Err(reject(format!("`{path}` is a directory, not a file.")));
    }
    if stat.size as usize > MAX_FILE_SIZE {
        return Err(reject(format!(
            "`{path}` is {} bytes, over the {MAX_FILE_SIZE}-byte search limit.",
            stat.size
        )));
    }

    let bytes = config
        .runtime
        .read_file(&resolved)
        .await
        .map_err(|e| e.to_string())?;
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.split('\n').collect();

    let context = context_lines.unwrap_or(DEFAULT_CONTEXT_LINES);
    let cap = max_results.unwrap_or(DEFAULT_MAX_RESULTS);

    let mut matches = Vec::new();
    let mut total_matches = 0usize;
    for (idx, line) in lines.iter().enumerate() {
        if !line.contains(pattern) {
            continue;
        }
        total_matches += 1;
        if matches.len() >= cap {
            continue;
        }
        let before_start = idx.saturating_sub(context);
        let after_end = (idx + 1 + context).min(lines.len());
        matches.push(Match {
            line_number: idx + 1,
            line_content: (*line).to_string(),
            context_before: lines[before_start..idx].iter().map(|s| s.to_string()).collect(),
            context_after: lines[idx + 1..after_end].iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(FileSearchResult {
        success: true,
        file_path: path.to_string(),
        pattern: pattern.to_string(),
        matches,
        total_matches,
        file_size: stat.size,
    })
}
