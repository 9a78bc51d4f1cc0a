//! Direct local process spawn and local filesystem access.

use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::oneshot;

use super::AbortSignal;
use super::ExecHandle;
use super::ExecRequest;
use super::FileStat;
use super::Runtime;
use super::posix_path;
use super::race_to_exit;
use crate::error::RuntimeError;
use crate::error::RuntimeResult;

/// Spawns processes directly on the machine this crate runs on, and reads
/// and writes files through the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalRuntime;

impl LocalRuntime {
    pub fn new() -> Self {
        Self
    }
}

/// Sends SIGKILL to a local process group. A group that has already exited
/// is not an error — the OS simply has nothing left to signal.
fn killpg(pid: i32) -> RuntimeResult<()> {
    // Safety: `libc::killpg` only reads its integer arguments; it cannot
    // cause memory unsafety. A missing target process group is reported via
    // `errno` and surfaced as an `io::Error`, which we intentionally ignore
    // here (the group may have already exited on its own).
    let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // Already dead; not an error for our purposes.
            Ok(())
        } else {
            Err(RuntimeError::Io(err))
        }
    }
}

#[async_trait]
impl Runtime for LocalRuntime {
    async fn exec(&self, request: ExecRequest) -> RuntimeResult<ExecHandle> {
        let ExecRequest {
            script,
            cwd,
            env,
            timeout,
            niceness,
            abort,
        } = request;

        // `setsid` is execed directly (no shell involved) so it becomes the
        // leader of a brand-new session and process group without forking;
        // its pid is therefore also the pgid every descendant inherits,
        // including background children the script itself spawns.
        let mut cmd = Command::new("setsid");
        if let Some(nice) = niceness {
            cmd.arg("nice").arg("-n").arg(nice.to_string());
        }
        cmd.arg("bash").arg("-c").arg(&script);
        cmd.current_dir(&cwd);
        cmd.envs(&env);
        // Never create a readable stdin pipe: some commands hang forever
        // waiting for input (e.g. ripgrep's stdin heuristic), and the
        // assistant has no way to supply any.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| RuntimeError::Io(std::io::Error::other("child exited before spawn completed")))?
            as i32;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Io(std::io::Error::other("stdout pipe unavailable")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::Io(std::io::Error::other("stderr pipe unavailable")))?;

        let killer: Arc<dyn Fn() -> RuntimeResult<()> + Send + Sync> = Arc::new(move || killpg(pid));
        let killer_for_race = killer.clone();

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let wait = async move {
                let status = child.wait().await.map_err(RuntimeError::Io)?;
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    if let Some(signal) = status.signal() {
                        return Ok(128 + signal);
                    }
                }
                Ok(status.code().unwrap_or(-1))
            };
            race_to_exit(wait, timeout, abort, move || killer_for_race(), tx).await;
        });

        Ok(ExecHandle::new(
            Box::pin(stdout) as Pin<Box<dyn AsyncRead + Send>>,
            Box::pin(stderr) as Pin<Box<dyn AsyncRead + Send>>,
            rx,
            killer,
        ))
    }

    async fn stat(&self, path: &str) -> RuntimeResult<FileStat> {
        let meta = tokio::fs::metadata(path).await?;
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(FileStat {
            size: meta.len(),
            is_directory: meta.is_dir(),
            mtime_ms,
        })
    }

    async fn read_file(&self, path: &str) -> RuntimeResult<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write_file(&self, path: &str, contents: Vec<u8>) -> RuntimeResult<()> {
        // Atomic from the caller's perspective: write to a sibling temp file
        // then rename it over the destination. A crash mid-write leaves the
        // original file untouched rather than a half-written one.
        let path = std::path::Path::new(path);
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            use std::io::Write;
            tmp.write_all(&contents)?;
            tmp.flush()?;
        }
        tmp.persist(path)
            .map_err(|e| RuntimeError::Io(e.error))?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> RuntimeResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RuntimeError::Io(e)),
        }
    }

    fn normalize_path(&self, target: &str, base: &str) -> String {
        posix_path::normalize(target, base)
    }
}
