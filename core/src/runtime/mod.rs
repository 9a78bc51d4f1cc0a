//! Runtime abstraction (C1, §4.1).
//!
//! A uniform contract for process exec, file stat/read/write, and path
//! normalization, implemented either by spawning directly on the local
//! machine ([`local::LocalRuntime`]) or by tunneling over SSH to a remote
//! workspace ([`remote::RemoteRuntime`]). Every higher component in this
//! crate is written only against the [`Runtime`] trait — none of them may
//! apply host-local path logic to a path that came from a runtime; that is
//! what [`Runtime::normalize_path`] is for.

pub mod local;
pub mod posix_path;
pub mod remote;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::Notify;
use tokio::sync::oneshot;

pub use local::LocalRuntime;
pub use remote::RemoteRuntime;

use crate::error::EXIT_CODE_ABORTED;
use crate::error::EXIT_CODE_TIMEOUT;
use crate::error::RuntimeError;
use crate::error::RuntimeResult;

/// A cooperative cancellation signal. Cloning shares the same underlying
/// notification; firing it wakes every clone's waiter exactly once.
#[derive(Clone, Default)]
pub struct AbortSignal(Arc<Notify>);

impl AbortSignal {
    pub fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    /// Fires the signal. Idempotent with respect to future waiters: once
    /// fired, every `aborted()` call resolves immediately.
    pub fn fire(&self) {
        self.0.notify_waiters();
    }

    pub async fn aborted(&self) {
        self.0.notified().await;
    }
}

/// Parameters for [`Runtime::exec`] (§3).
pub struct ExecRequest {
    pub script: String,
    /// Working directory, in the runtime's own path coordinates.
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
    pub niceness: Option<i32>,
    pub abort: AbortSignal,
}

/// A live process handle (§3 `ExecStream`).
///
/// Stdin is force-closed by the runtime before this handle is returned —
/// the spawned shell never reads input from the assistant, and a polite
/// close over SSH can hang, so there is nothing left for a caller to do
/// with stdin.
pub struct ExecHandle {
    pub stdout: Pin<Box<dyn AsyncRead + Send>>,
    pub stderr: Pin<Box<dyn AsyncRead + Send>>,
    pub exit_rx: oneshot::Receiver<i32>,
    killer: Arc<dyn Fn() -> RuntimeResult<()> + Send + Sync>,
}

impl ExecHandle {
    pub fn new(
        stdout: Pin<Box<dyn AsyncRead + Send>>,
        stderr: Pin<Box<dyn AsyncRead + Send>>,
        exit_rx: oneshot::Receiver<i32>,
        killer: Arc<dyn Fn() -> RuntimeResult<()> + Send + Sync>,
    ) -> Self {
        Self {
            stdout,
            stderr,
            exit_rx,
            killer,
        }
    }

    /// Sends SIGKILL to the entire process group. Safe to call more than
    /// once; a group that has already exited is simply not signaled again
    /// by the OS. Used both by a runtime's own timeout/abort enforcement
    /// and, independently, by the process supervisor (C3) when the output
    /// accountant (C2) hits the file-preservation cap.
    pub fn kill_process_group(&self) -> RuntimeResult<()> {
        (self.killer)()
    }

    /// A cheap, independently callable clone of the kill closure. Useful
    /// when the caller needs to destructure the handle to take `exit_rx` by
    /// value while retaining the ability to kill the group mid-stream.
    pub fn killer(&self) -> Arc<dyn Fn() -> RuntimeResult<()> + Send + Sync> {
        self.killer.clone()
    }

    /// Awaits the exit code. Resolves to [`EXIT_CODE_ABORTED`] or
    /// [`EXIT_CODE_TIMEOUT`] if the runtime killed the process group for
    /// those reasons; otherwise the shell's natural exit code.
    pub async fn wait_exit(self) -> RuntimeResult<i32> {
        self.exit_rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: u64,
    pub is_directory: bool,
    pub mtime_ms: i64,
}

/// Races a child-completion future against a timeout and an abort signal,
/// sending the appropriate sentinel (or natural) exit code on `tx` and
/// invoking `kill` whenever the process group must die. Shared by every
/// runtime implementation so that timeout/abort semantics cannot drift
/// between local and remote.
pub(crate) async fn race_to_exit<F>(
    wait: F,
    timeout: Duration,
    abort: AbortSignal,
    kill: impl Fn() -> RuntimeResult<()>,
    tx: oneshot::Sender<i32>,
) where
    F: std::future::Future<Output = RuntimeResult<i32>>,
{
    tokio::pin!(wait);
    let code = tokio::select! {
        result = &mut wait => {
            match result {
                Ok(code) => code,
                Err(_) => {
                    let _ = kill();
                    EXIT_CODE_ABORTED
                }
            }
        }
        _ = tokio::time::sleep(timeout) => {
            let _ = kill();
            EXIT_CODE_TIMEOUT
        }
        _ = abort.aborted() => {
            let _ = kill();
            EXIT_CODE_ABORTED
        }
    };
    let _ = tx.send(code);
}

/// Capability bundle a tool call uses for every process/filesystem
/// operation (§3, §4.1).
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn exec(&self, request: ExecRequest) -> RuntimeResult<ExecHandle>;
    async fn stat(&self, path: &str) -> RuntimeResult<FileStat>;
    async fn read_file(&self, path: &str) -> RuntimeResult<Vec<u8>>;
    async fn write_file(&self, path: &str, contents: Vec<u8>) -> RuntimeResult<()>;
    /// Removes a file. A target that is already missing is not an error —
    /// the caller's intent (the file should not exist) is already satisfied.
    async fn remove_file(&self, path: &str) -> RuntimeResult<()>;

    /// Resolves `target` against `base` using the runtime's own path
    /// semantics. If `target` is absolute, returns it normalized
    /// (collapsing `.`/`..`); otherwise resolves it against `base`. This is
    /// the only correct way to resolve a path produced by, or destined
    /// for, this runtime.
    fn normalize_path(&self, target: &str, base: &str) -> String;
}

/// Hard-coded environment injected into every spawned shell (§4.1, §6) to
/// stop `git commit`, `git rebase -i`, and credential helpers from blocking
/// on interactive input the assistant can never supply.
pub fn editor_blocker_env() -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("GIT_EDITOR".to_string(), "true".to_string());
    env.insert("GIT_SEQUENCE_EDITOR".to_string(), "true".to_string());
    env.insert("EDITOR".to_string(), "true".to_string());
    env.insert("VISUAL".to_string(), "true".to_string());
    env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
    env
}
