//! Gitignore-aware directory listing (C6, §4.6).
//!
//! Unlike the other C6 tools, this one walks the local filesystem directly
//! rather than through the [`Runtime`](crate::runtime::Runtime) trait: the
//! runtime contract (§4.1) has no directory-listing primitive, and the
//! `ignore` crate's gitignore matcher has no remote-filesystem equivalent.
//! Listing a remote workspace's tree is therefore out of scope for this
//! tool today — see the open question recorded in DESIGN.md.

use std::path::Path;
use std::path::PathBuf;

use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use serde::Serialize;

use super::await_init;
use super::reject;
use crate::config::ToolConfiguration;

const DEFAULT_MAX_DEPTH: usize = 1;
const HARD_MAX_DEPTH: usize = 10;
const DEFAULT_MAX_ENTRIES: usize = 64;
const HARD_MAX_ENTRIES: usize = 128;

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub path: String,
    pub is_directory: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileListResult {
    pub success: bool,
    pub entries: Vec<ListEntry>,
}

pub async fn file_list(
    config: &ToolConfiguration,
    path: &str,
    max_depth: Option<usize>,
    pattern: Option<&str>,
    gitignore: bool,
    max_entries: Option<usize>,
) -> Result<FileListResult, String> {
    await_init(config).await;

    let cwd = config.cwd.to_string_lossy().to_string();
    let resolved = super::resolve_in_workspace(config.runtime.as_ref(), &cwd, path)?;
    let root = PathBuf::from(&resolved);

    let depth = max_depth.unwrap_or(DEFAULT_MAX_DEPTH).clamp(1, HARD_MAX_DEPTH);
    let cap = max_entries.unwrap_or(DEFAULT_MAX_ENTRIES).min(HARD_MAX_ENTRIES);

    let matcher = if gitignore {
        load_gitignore(&root)
    } else {
        Gitignore::empty()
    };

    let mut entries = Vec::new();
    collect(&root, "", depth, pattern, &matcher, &mut entries)?;

    if entries.len() > cap {
        return Err(reject(format!(
            "Found {} entries under `{path}`, exceeding the requested limit of {cap}; narrow the \
             path or pattern.",
            entries.len()
        )));
    }

    Ok(FileListResult {
        success: true,
        entries,
    })
}

fn load_gitignore(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    let _ = builder.add(root.join(".gitignore"));
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Depth-first listing. Directories sort before files, alphabetically
/// within each group; a directory with no matching descendants (and whose
/// own name doesn't match `pattern`) is pruned from the result entirely.
fn collect(
    dir: &Path,
    rel_prefix: &str,
    depth_remaining: usize,
    pattern: Option<&str>,
    gitignore: &Gitignore,
    entries: &mut Vec<ListEntry>,
) -> Result<(), String> {
    let mut children: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| e.to_string())?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() != ".git")
        .collect();
    children.sort_by_key(|entry| {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        (is_file, entry.file_name())
    });

    for child in children {
        let is_dir = child.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let full_path = child.path();
        if gitignore.matched(&full_path, is_dir).is_ignore() {
            continue;
        }

        let name = child.file_name().to_string_lossy().to_string();
        let rel = if rel_prefix.is_empty() {
            name.clone()
        } else {
            format!("{rel_prefix}/{name}")
        };
        let name_matches = pattern.map(|p| name.contains(p)).unwrap_or(true);

        if is_dir {
            let mut descendants = Vec::new();
            if depth_remaining > 1 {
                collect(&full_path, &rel, depth_remaining - 1, pattern, gitignore, &mut descendants)?;
            }
            if name_matches || !descendants.is_empty() {
                entries.push(ListEntry {
                    path: rel,
                    is_directory: true,
                });
                entries.extend(descendants);
            }
        } else if name_matches {
            entries.push(ListEntry {
                path: rel,
                is_directory: false,
            });
        }
    }

    Ok(())
}
