//! Tool surface (§6): the policy layer built on top of C1–C3, one module per
//! tool family.

pub mod bash;
pub mod file_edit;
pub mod file_list;
pub mod file_read;
pub mod file_search;
pub mod plan;
pub mod schema;
pub mod status;
pub mod todo;

use std::path::Path;

use crate::config::ToolConfiguration;
use crate::runtime::Runtime;

/// Runtime-dependent tools block on workspace init before touching the
/// filesystem or spawning anything (§5, "Init gate"). Non-runtime tools
/// (todo, status, propose_plan) skip this entirely.
pub(crate) async fn await_init(config: &ToolConfiguration) {
    config
        .init_state_manager
        .wait_for_init(&config.workspace_id)
        .await;
}

/// Logs a tool rejection at `debug!` with the same message the caller gets
/// back, so operators can correlate a denied call with its tool invocation
/// (§4.6 logging hook). Used by the C6 read/search/list tools; C5's own
/// `[WRITE DENIED]`-prefixed rejections log through `file_edit::denied`.
pub(crate) fn reject(message: impl Into<String>) -> String {
    let message = message.into();
    tracing::debug!(message = %message, "rejected");
    message
}

/// Resolves `path` against the workspace root and confines it there (§4.5
/// step 1–3, shared by C5 and C6). Returns the resolved path in the
/// runtime's own coordinates, or a human-facing rejection message.
pub(crate) fn resolve_in_workspace(
    runtime: &dyn Runtime,
    cwd: &str,
    path: &str,
) -> Result<String, String> {
    if Path::new(path).is_absolute() && path.starts_with(cwd) {
        let message = format!(
            "`{path}` already starts with the workspace directory `{cwd}`; pass a path relative \
             to the workspace instead."
        );
        tracing::debug!(message = %message, "path confinement: rejected");
        return Err(message);
    }

    let resolved = runtime.normalize_path(path, cwd);
    let cwd_norm = runtime.normalize_path(".", cwd);
    let confined = resolved == cwd_norm
        || resolved.starts_with(&format!("{}/", cwd_norm.trim_end_matches('/')));
    if !confined {
        let message = format!(
            "`{path}` is restricted to the workspace directory `{cwd}`; ask the user for \
             permission first."
        );
        tracing::debug!(message = %message, "path confinement: rejected");
        return Err(message);
    }
    Ok(resolved)
}
