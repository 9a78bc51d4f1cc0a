//! Per-call tool invocation context (§3).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::init::InitStateManager;
use crate::runtime::Runtime;

/// How a bash call should report output that overflows its caps (§4.4,
/// §6). `Tmpfile` is the default for agent callers; `Truncate` is meant for
/// IPC callers that want the (much larger) inline truncated payload instead
/// of a pointer to an overflow file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    Truncate,
    Tmpfile,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Tmpfile
    }
}

/// A validated `nice` value in `[-20, 19]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Niceness(i32);

impl Niceness {
    pub fn new(value: i32) -> Option<Self> {
        if (-20..=19).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

/// The context a tool call runs in: one per tool call, with no shared
/// mutability with any other call.
#[derive(Clone)]
pub struct ToolConfiguration {
    /// Workspace root, in the runtime's own path coordinates.
    pub cwd: PathBuf,
    /// Capability bundle used for every process/filesystem operation this
    /// call makes.
    pub runtime: Arc<dyn Runtime>,
    pub workspace_id: String,
    pub init_state_manager: Arc<dyn InitStateManager>,
    /// Environment variable name -> value, injected into every spawned
    /// shell in addition to the hard-coded editor/credential blockers
    /// (§4.1).
    pub secrets: HashMap<String, String>,
    pub niceness: Option<Niceness>,
    /// POSIX path to the directory used for `todos.json` and bash overflow
    /// files.
    pub runtime_temp_dir: String,
    pub overflow_policy: OverflowPolicy,
}

impl ToolConfiguration {
    pub fn new(
        cwd: PathBuf,
        runtime: Arc<dyn Runtime>,
        workspace_id: impl Into<String>,
        init_state_manager: Arc<dyn InitStateManager>,
        runtime_temp_dir: impl Into<String>,
    ) -> Self {
        Self {
            cwd,
            runtime,
            workspace_id: workspace_id.into(),
            init_state_manager,
            secrets: HashMap::new(),
            niceness: None,
            runtime_temp_dir: runtime_temp_dir.into(),
            overflow_policy: OverflowPolicy::default(),
        }
    }

    pub fn todos_path(&self) -> String {
        format!("{}/todos.json", self.runtime_temp_dir.trim_end_matches('/'))
    }
}
