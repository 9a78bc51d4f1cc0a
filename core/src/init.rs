//! Workspace init gate (§5).
//!
//! Runtime-dependent tools (bash, file_read, file_edit_*, file_search,
//! file_list) block on [`InitStateManager::wait_for_init`] before doing any
//! work. Non-runtime tools (todo, status, propose_plan, compact_summary)
//! skip the gate entirely. The gate is a no-op for workspaces that are
//! already initialized.

use async_trait::async_trait;

/// Signals when a workspace is ready for runtime-backed tool calls. Owned
/// and driven by the workspace init manager outside this crate; this trait
/// is the only seam the core depends on.
#[async_trait]
pub trait InitStateManager: Send + Sync {
    async fn wait_for_init(&self, workspace_id: &str);
}

/// An init manager that is always ready. Useful for runtimes or workspaces
/// that don't require async initialization, and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReady;

#[async_trait]
impl InitStateManager for AlwaysReady {
    async fn wait_for_init(&self, _workspace_id: &str) {}
}
