//! File edit pipeline (C5, §4.5): one shared read → validate → transform →
//! write → diff pipeline behind three edit variants.

use serde::Serialize;
use similar::TextDiff;

use super::await_init;
use super::resolve_in_workspace;
use crate::config::ToolConfiguration;
use crate::error::WRITE_DENIED_PREFIX;

/// Files larger than this are rejected outright; editing them through this
/// pipeline would mean reading the whole thing into memory for a diff no
/// one can usefully review.
pub const MAX_FILE_SIZE: usize = 1024 * 1024;

fn denied(message: impl Into<String>) -> String {
    let message = message.into();
    tracing::debug!(message = %message, "file edit: rejected");
    format!("{WRITE_DENIED_PREFIX}{message}")
}

fn unified_diff(resolved_path: &str, old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(resolved_path, resolved_path)
        .to_string()
}

/// Steps 1–5: redundant-prefix check, confinement, resolution, stat, read.
async fn prepare(config: &ToolConfiguration, path: &str) -> Result<(String, String), String> {
    let cwd = config.cwd.to_string_lossy().to_string();
    let resolved =
        resolve_in_workspace(config.runtime.as_ref(), &cwd, path).map_err(denied)?;

    let stat = config
        .runtime
        .stat(&resolved)
        .await
        .map_err(|e| denied(e.to_string()))?;
    if stat.is_directory {
        return Err(denied(format!("`{path}` is a directory, not a file.")));
    }
    if stat.size as usize > MAX_FILE_SIZE {
        return Err(denied(format!(
            "`{path}` is {} bytes, over the {MAX_FILE_SIZE}-byte edit limit; use grep/sed/awk via \
             bash to operate on it instead.",
            stat.size
        )));
    }

    let bytes = config
        .runtime
        .read_file(&resolved)
        .await
        .map_err(|e| denied(e.to_string()))?;
    let content =
        String::from_utf8(bytes).map_err(|_| denied(format!("`{path}` is not valid UTF-8.")))?;
    Ok((resolved, content))
}

/// Step 7 (write) + step 8 (diff).
async fn write_and_diff(
    config: &ToolConfiguration,
    resolved: &str,
    old: &str,
    new: String,
) -> Result<String, String> {
    config
        .runtime
        .write_file(resolved, new.clone().into_bytes())
        .await
        .map_err(|e| denied(e.to_string()))?;
    Ok(unified_diff(resolved, old, &new))
}

#[derive(Debug, Clone, Serialize)]
pub struct StringReplaceResult {
    pub success: bool,
    pub diff: String,
    pub edits_applied: usize,
}

pub async fn replace_string(
    config: &ToolConfiguration,
    path: &str,
    old_string: &str,
    new_string: &str,
    replace_count: Option<i64>,
) -> Result<StringReplaceResult, String> {
    await_init(config).await;
    let (resolved, content) = prepare(config, path).await?;

    if old_string.is_empty() {
        return Err(denied("old_string must not be empty."));
    }
    let occurrences = content.matches(old_string).count();
    if occurrences == 0 {
        return Err(denied(format!("old_string was not found in `{path}`.")));
    }

    let requested = replace_count.unwrap_or(1);
    if requested == 1 && occurrences > 1 {
        return Err(denied(format!(
            "old_string appears {occurrences} times; expand the context or set replace_count to \
             {occurrences} (or -1) to replace every occurrence."
        )));
    }
    if requested != -1 && requested > occurrences as i64 {
        return Err(denied(format!(
            "replace_count ({requested}) exceeds the {occurrences} occurrences found."
        )));
    }

    let edits_applied = if requested == -1 {
        occurrences
    } else {
        requested.max(0) as usize
    };
    let new_content = replace_leftmost(&content, old_string, new_string, edits_applied);
    let diff = write_and_diff(config, &resolved, &content, new_content).await?;
    Ok(StringReplaceResult {
        success: true,
        diff,
        edits_applied,
    })
}

fn replace_leftmost(content: &str, old: &str, new: &str, count: usize) -> String {
    if count == 0 {
        return content.to_string();
    }
    let mut result = String::with_capacity(content.len());
    let mut remaining = content;
    for _ in 0..count {
        match remaining.find(old) {
            Some(idx) => {
                result.push_str(&remaining[..idx]);
                result.push_str(new);
                remaining = &remaining[idx + old.len()..];
            }
            None => break,
        }
    }
    result.push_str(remaining);
    result
}

#[derive(Debug, Clone, Serialize)]
pub struct LineReplaceResult {
    pub success: bool,
    pub diff: String,
    pub lines_replaced: usize,
    pub line_delta: i64,
}

pub async fn replace_lines(
    config: &ToolConfiguration,
    path: &str,
    start_line: usize,
    end_line: usize,
    new_lines: Vec<String>,
    expected_lines: Option<Vec<String>>,
) -> Result<LineReplaceResult, String> {
    await_init(config).await;
    let (resolved, content) = prepare(config, path).await?;

    if start_line < 1 {
        return Err(denied("start_line must be >= 1."));
    }
    if end_line < start_line {
        return Err(denied("end_line must be >= start_line."));
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let start_idx = start_line - 1;
    if start_idx >= lines.len() {
        return Err(denied(format!(
            "start_line {start_line} is past the end of `{path}` ({} lines).",
            lines.len()
        )));
    }
    let end_idx = end_line.min(lines.len()) - 1;

    let current_range: Vec<String> =
        lines[start_idx..=end_idx].iter().map(|s| s.to_string()).collect();
    if let Some(expected) = &expected_lines {
        if expected != &current_range {
            return Err(denied(
                "expected_lines does not match the file's current content at that range; re-read \
                 the file before editing.",
            ));
        }
    }

    let old_line_count = lines.len();
    let mut new_full: Vec<String> = Vec::with_capacity(lines.len());
    new_full.extend(lines[..start_idx].iter().map(|s| s.to_string()));
    new_full.extend(new_lines.into_iter());
    new_full.extend(lines[end_idx + 1..].iter().map(|s| s.to_string()));

    let lines_replaced = end_idx - start_idx + 1;
    let line_delta = new_full.len() as i64 - old_line_count as i64;
    let new_content = new_full.join("\n");
    let diff = write_and_diff(config, &resolved, &content, new_content).await?;
    Ok(LineReplaceResult {
        success: true,
        diff,
        lines_replaced,
        line_delta,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertResult {
    pub success: bool,
    pub diff: String,
}

pub async fn insert(
    config: &ToolConfiguration,
    path: &str,
    line_offset: usize,
    content_to_insert: &str,
    create: bool,
) -> Result<InsertResult, String> {
    await_init(config).await;
    let cwd = config.cwd.to_string_lossy().to_string();
    let resolved =
        resolve_in_workspace(config.runtime.as_ref(), &cwd, path).map_err(denied)?;

    let existing = match config.runtime.stat(&resolved).await {
        Ok(stat) => {
            if stat.is_directory {
                return Err(denied(format!("`{path}` is a directory, not a file.")));
            }
            if stat.size as usize > MAX_FILE_SIZE {
                return Err(denied(format!(
                    "`{path}` is over the {MAX_FILE_SIZE}-byte edit limit."
                )));
            }
            let bytes = config
                .runtime
                .read_file(&resolved)
                .await
                .map_err(|e| denied(e.to_string()))?;
            String::from_utf8(bytes)
                .map_err(|_| denied(format!("`{path}` is not valid UTF-8.")))?
        }
        Err(_) if create => String::new(),
        Err(e) => return Err(denied(e.to_string())),
    };

    let lines: Vec<&str> = if existing.is_empty() {
        Vec::new()
    } else {
        existing.split('\n').collect()
    };
    if line_offset > lines.len() {
        return Err(denied(format!(
            "line_offset {line_offset} is past the end of `{path}` ({} lines).",
            lines.len()
        )));
    }

    let at_eof = line_offset == lines.len();
    let insertion = if content_to_insert.ends_with('\n') && !at_eof {
        &content_to_insert[..content_to_insert.len() - 1]
    } else {
        content_to_insert
    };

    let mut new_lines: Vec<String> = Vec::with_capacity(lines.len() + 1);
    new_lines.extend(lines[..line_offset].iter().map(|s| s.to_string()));
    new_lines.push(insertion.to_string());
    new_lines.extend(lines[line_offset..].iter().map(|s| s.to_string()));
    let new_content = new_lines.join("\n");

    let diff = write_and_diff(config, &resolved, &existing, new_content).await?;
    Ok(InsertResult { success: true, diff })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_leftmost_applies_only_the_requested_count() {
        let result = replace_leftmost("foo foo foo", "foo", "bar", 2);
        assert_eq!(result, "bar bar foo");
    }

    #[test]
    fn replace_leftmost_zero_is_a_no_op() {
        assert_eq!(replace_leftmost("foo", "foo", "bar", 0), "foo");
    }

    #[test]
    fn replace_leftmost_identical_strings_is_a_no_op_on_content() {
        assert_eq!(replace_leftmost("foo bar", "foo", "foo", 1), "foo bar");
    }
}
