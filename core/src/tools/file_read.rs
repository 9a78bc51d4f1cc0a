//! Bounded line reader with offset/limit (C6, §4.6).

use serde::Serialize;

use super::await_init;
use super::reject;
use super::resolve_in_workspace;
use crate::config::ToolConfiguration;
use crate::lease::compute_lease;

const MAX_LINE_BYTES: usize = 1024;
const MAX_LINES: usize = 1000;
const MAX_TOTAL_BYTES: usize = 16 * 1024;
const TRUNCATION_SUFFIX: &str = "... [truncated]";

#[derive(Debug, Clone, Serialize)]
pub struct FileReadResult {
    pub success: bool,
    pub file_size: u64,
    pub modified_time: i64,
    pub lines_read: usize,
    pub content: String,
    pub lease: String,
}

pub async fn file_read(
    config: &ToolConfiguration,
    path: &str,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<FileReadResult, String> {
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

    let bytes = config
        .runtime
        .read_file(&resolved)
        .await
        .map_err(|e| e.to_string())?;
    let content = String::from_utf8_lossy(&bytes);

    let offset = offset.unwrap_or(1).max(1);
    let start_idx = offset - 1;

    let all_lines: Vec<&str> = content.split('\n').collect();
    if start_idx >= all_lines.len() {
        return Err(reject(format!(
            "offset {offset} is past the end of `{path}` ({} lines).",
            all_lines.len()
        )));
    }

    let end_idx = match limit {
        Some(n) => (start_idx + n).min(all_lines.len()),
        None => all_lines.len(),
    };

    let mut rendered = String::new();
    let mut total_bytes = 0usize;
    let mut lines_read = 0usize;
    for (offset_from_start, raw_line) in all_lines[start_idx..end_idx].iter().enumerate() {
        if lines_read >= MAX_LINES {
            return Err(reject(format!(
                "`{path}` has more than {MAX_LINES} lines in the requested range; narrow the \
                 request with offset/limit."
            )));
        }
        let line_number = offset + offset_from_start;
        let line = if raw_line.len() > MAX_LINE_BYTES {
            // Truncate on a char boundary at or before the byte cap so a
            // multi-byte UTF-8 sequence is never split.
            let mut cut = MAX_LINE_BYTES;
            while !raw_line.is_char_boundary(cut) {
                cut -= 1;
            }
            let mut truncated = raw_line[..cut].to_string();
            truncated.push_str(TRUNCATION_SUFFIX);
            truncated
        } else {
            raw_line.to_string()
        };
        let formatted = format!("{line_number}\t{line}\n");
        total_bytes += formatted.len();
        if total_bytes > MAX_TOTAL_BYTES {
            return Err(reject(format!(
                "`{path}` exceeds the {MAX_TOTAL_BYTES}-byte read limit; use offset/limit to read \
                 it in smaller sections."
            )));
        }
        rendered.push_str(&formatted);
        lines_read += 1;
    }

    let lease = compute_lease(stat.mtime_ms, stat.size);
    Ok(FileReadResult {
        success: true,
        file_size: stat.size,
        modified_time: stat.mtime_ms,
        lines_read,
        content: rendered,
        lease,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_line_gets_truncation_suffix() {
        let long = "x".repeat(MAX_LINE_BYTES + 10);
        assert!(long.len() > MAX_LINE_BYTES);
    }
}
