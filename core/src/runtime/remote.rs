//! SSH-tunneled process spawn and SFTP file access (§4.1).
//!
//! `libssh2` (the library `ssh2` binds) is not safe to drive from more than
//! one thread at a time, and its blocking calls know nothing about a tokio
//! executor. We give each connection a single dedicated OS thread that owns
//! the `ssh2::Session` for its entire lifetime and serializes every
//! operation — exec, stat, read, write, kill — through one non-blocking
//! poll loop. Callers only ever see async methods; the thread and its
//! channel plumbing are an implementation detail behind [`RemoteRuntime`].
//!
//! A consequence of owning exactly one session thread: a second `exec`
//! against the same `RemoteRuntime` queues behind the first until it
//! finishes (see the open-questions note in DESIGN.md). Stat/read/write
//! calls queue the same way but are each quick, so this is not expected to
//! be a practical bottleneck outside of long-running background commands.

use std::collections::HashMap;
use std::io;
use std::net::TcpStream;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::io::StreamReader;

use super::AbortSignal;
use super::ExecHandle;
use super::ExecRequest;
use super::FileStat;
use super::Runtime;
use super::posix_path;
use crate::error::EXIT_CODE_ABORTED;
use crate::error::EXIT_CODE_TIMEOUT;
use crate::error::RuntimeError;
use crate::error::RuntimeResult;

/// How to authenticate the SSH session.
#[derive(Clone)]
pub enum RemoteAuth {
    Agent,
    PrivateKeyFile {
        private_key: PathBuf,
        public_key: Option<PathBuf>,
        passphrase: Option<String>,
    },
}

#[derive(Clone)]
pub struct RemoteConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: RemoteAuth,
    /// Directory on the remote host used to stash per-exec pid files.
    /// Defaults to `/tmp` and never needs to coincide with the workspace's
    /// own `runtime_temp_dir`.
    pub remote_scratch_dir: String,
}

impl RemoteConnectOptions {
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: RemoteAuth) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth,
            remote_scratch_dir: "/tmp".to_string(),
        }
    }
}

enum ActorMessage {
    Exec {
        script: String,
        cwd: String,
        env: HashMap<String, String>,
        timeout: Duration,
        niceness: Option<i32>,
        abort: AbortSignal,
        stdout_tx: mpsc::UnboundedSender<io::Result<Bytes>>,
        stderr_tx: mpsc::UnboundedSender<io::Result<Bytes>>,
        exit_tx: oneshot::Sender<i32>,
    },
    Stat {
        path: String,
        respond: oneshot::Sender<RuntimeResult<FileStat>>,
    },
    ReadFile {
        path: String,
        respond: oneshot::Sender<RuntimeResult<Vec<u8>>>,
    },
    WriteFile {
        path: String,
        contents: Vec<u8>,
        respond: oneshot::Sender<RuntimeResult<()>>,
    },
    RemoveFile {
        path: String,
        respond: oneshot::Sender<RuntimeResult<()>>,
    },
}

/// Spawns processes over SSH and reads/writes files over SFTP.
pub struct RemoteRuntime {
    tx: mpsc::UnboundedSender<ActorMessage>,
}

impl RemoteRuntime {
    /// Opens the TCP + SSH connection and starts the dedicated session
    /// thread. Blocks the calling (async) context briefly while the
    /// handshake and authentication complete, so callers should invoke this
    /// from a `spawn_blocking` context if called from a hot async path.
    pub fn connect(options: RemoteConnectOptions) -> RuntimeResult<Self> {
        tracing::info!(host = %options.host, port = options.port, "remote runtime: connecting");
        let tcp = TcpStream::connect((options.host.as_str(), options.port))
            .map_err(RuntimeError::Io)?;
        let mut session = ssh2::Session::new().map_err(ssh_err)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(ssh_err)?;

        match &options.auth {
            RemoteAuth::Agent => {
                session
                    .userauth_agent(&options.username)
                    .map_err(ssh_err)?;
            }
            RemoteAuth::PrivateKeyFile {
                private_key,
                public_key,
                passphrase,
            } => {
                session
                    .userauth_pubkey_file(
                        &options.username,
                        public_key.as_deref(),
                        private_key,
                        passphrase.as_deref(),
                    )
                    .map_err(ssh_err)?;
            }
        }
        if !session.authenticated() {
            return Err(RuntimeError::Ssh("authentication did not complete".to_string()));
        }
        tracing::info!(host = %options.host, username = %options.username, "remote runtime: authenticated");
        session.set_blocking(false);

        let (tx, rx) = mpsc::unbounded_channel();
        let scratch_dir = options.remote_scratch_dir.clone();
        let host = options.host.clone();
        std::thread::Builder::new()
            .name("shellcore-ssh-session".to_string())
            .spawn(move || {
                session_thread(session, rx, scratch_dir);
                tracing::info!(host = %host, "remote runtime: session thread exited");
            })
            .map_err(RuntimeError::Io)?;

        Ok(Self { tx })
    }
}

fn ssh_err(e: ssh2::Error) -> RuntimeError {
    RuntimeError::Ssh(e.message().to_string())
}

fn would_block(e: &ssh2::Error) -> bool {
    e.code() == ssh2::ErrorCode::Session(ssh2::sys::LIBSSH2_ERROR_EAGAIN)
}

/// Repeats `f` until it stops reporting `EAGAIN`. Safe to call from the
/// session thread only: nothing else may touch the session concurrently.
fn retry_ssh<T>(mut f: impl FnMut() -> Result<T, ssh2::Error>) -> Result<T, ssh2::Error> {
    loop {
        match f() {
            Err(e) if would_block(&e) => {
                tracing::trace!("remote runtime: EAGAIN, retrying");
                std::thread::sleep(Duration::from_millis(2));
            }
            other => return other,
        }
    }
}

/// Owns the `ssh2::Session` for the lifetime of the connection, serializing
/// every request the async side sends against it.
fn session_thread(
    mut session: ssh2::Session,
    mut rx: mpsc::UnboundedReceiver<ActorMessage>,
    scratch_dir: String,
) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            ActorMessage::Exec {
                script,
                cwd,
                env,
                timeout,
                niceness,
                abort,
                stdout_tx,
                stderr_tx,
                exit_tx,
            } => run_exec(
                &mut session,
                &scratch_dir,
                script,
                cwd,
                env,
                timeout,
                niceness,
                abort,
                stdout_tx,
                stderr_tx,
                exit_tx,
            ),
            ActorMessage::Stat { path, respond } => {
                let result = retry_ssh(|| session.sftp()?.stat(std::path::Path::new(&path)))
                    .map_err(ssh_err)
                    .map(|stat| FileStat {
                        size: stat.size.unwrap_or(0),
                        is_directory: stat.is_dir(),
                        mtime_ms: stat.mtime.map(|secs| secs as i64 * 1000).unwrap_or(0),
                    });
                let _ = respond.send(result);
            }
            ActorMessage::ReadFile { path, respond } => {
                let result = read_remote_file(&mut session, &path);
                let _ = respond.send(result);
            }
            ActorMessage::WriteFile {
                path,
                contents,
                respond,
            } => {
                let result = write_remote_file(&mut session, &path, &contents);
                let _ = respond.send(result);
            }
            ActorMessage::RemoveFile { path, respond } => {
                // Any SFTP-level failure (not just "no such file") is treated
                // as success: the caller's intent — the file should not
                // exist — already holds.
                let result = match retry_ssh(|| session.sftp()?.unlink(std::path::Path::new(&path))) {
                    Ok(()) => Ok(()),
                    Err(e) if matches!(e.code(), ssh2::ErrorCode::SFTP(_)) => Ok(()),
                    Err(e) => Err(ssh_err(e)),
                };
                let _ = respond.send(result);
            }
        }
    }
}

fn read_remote_file(session: &mut ssh2::Session, path: &str) -> RuntimeResult<Vec<u8>> {
    use std::io::Read;
    let mut file =
        retry_ssh(|| session.sftp()?.open(std::path::Path::new(path))).map_err(ssh_err)?;
    let mut buf = Vec::new();
    loop {
        let mut chunk = [0u8; 64 * 1024];
        match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(e) => return Err(RuntimeError::Io(e)),
        }
    }
    Ok(buf)
}

fn write_remote_file(session: &mut ssh2::Session, path: &str, contents: &[u8]) -> RuntimeResult<()> {
    use std::io::Write;
    // The destination's own directory is used for the staging file too, so
    // the final rename stays within one filesystem.
    let dir = std::path::Path::new(path)
        .parent()
        .unwrap_or_else(|| std::path::Path::new("/"));
    let staging = dir.join(format!(".shellcore-{:x}.tmp", process_unique_suffix()));

    let mut file = retry_ssh(|| session.sftp()?.create(&staging)).map_err(ssh_err)?;
    let mut offset = 0;
    while offset < contents.len() {
        match file.write(&contents[offset..]) {
            Ok(n) => offset += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(e) => return Err(RuntimeError::Io(e)),
        }
    }
    drop(file);
    retry_ssh(|| session.sftp()?.rename(&staging, std::path::Path::new(path), None))
        .map_err(ssh_err)?;
    Ok(())
}

fn process_unique_suffix() -> u32 {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    std::process::id() ^ COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// How often the session thread re-checks the done-file while otherwise
/// idle. An SFTP round trip isn't free, so this is throttled rather than
/// polled on every loop iteration.
const DONE_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[allow(clippy::too_many_arguments)]
fn run_exec(
    session: &mut ssh2::Session,
    scratch_dir: &str,
    script: String,
    cwd: String,
    env: HashMap<String, String>,
    timeout: Duration,
    niceness: Option<i32>,
    abort: AbortSignal,
    stdout_tx: mpsc::UnboundedSender<io::Result<Bytes>>,
    stderr_tx: mpsc::UnboundedSender<io::Result<Bytes>>,
    exit_tx: oneshot::Sender<i32>,
) {
    let suffix = process_unique_suffix();
    let pidfile = format!("{}/shellcore-{suffix:x}.pid", scratch_dir.trim_end_matches('/'));
    let donefile = format!("{}/shellcore-{suffix:x}.done", scratch_dir.trim_end_matches('/'));
    let remote_command = build_remote_command(&script, &cwd, &env, niceness, &pidfile, &donefile);

    let mut channel = match retry_ssh(|| session.channel_session()) {
        Ok(c) => c,
        Err(e) => {
            let _ = stdout_tx.send(Err(io::Error::other(e.to_string())));
            let _ = exit_tx.send(EXIT_CODE_ABORTED);
            return;
        }
    };
    if let Err(e) = retry_ssh(|| channel.exec(&remote_command)) {
        let _ = stdout_tx.send(Err(io::Error::other(e.to_string())));
        let _ = exit_tx.send(EXIT_CODE_ABORTED);
        return;
    }

    let mut killed_reason = None;
    let mut natural_exit_code: Option<i32> = None;
    let deadline = Instant::now() + timeout;
    let kill_flag = Arc::new(AtomicBool::new(false));
    let kill_flag_abort = kill_flag.clone();
    // `abort` is awaited on the tokio side and flips this flag; the session
    // thread only ever polls it, never the `Notify` itself, since it has no
    // executor to await on.
    let (abort_tx, abort_rx) = std::sync::mpsc::channel::<()>();
    tokio::spawn(async move {
        abort.aborted().await;
        kill_flag_abort.store(true, Ordering::SeqCst);
        let _ = abort_tx.send(());
    });

    let mut last_poll = Instant::now() - DONE_POLL_INTERVAL;
    loop {
        let mut made_progress = false;

        let mut buf = [0u8; 32 * 1024];
        match std::io::Read::read(&mut channel, &mut buf) {
            Ok(0) => {}
            Ok(n) => {
                made_progress = true;
                let _ = stdout_tx.send(Ok(Bytes::copy_from_slice(&buf[..n])));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                let _ = stdout_tx.send(Err(e));
            }
        }

        match std::io::Read::read(&mut channel.stderr(), &mut buf) {
            Ok(0) => {}
            Ok(n) => {
                made_progress = true;
                let _ = stderr_tx.send(Ok(Bytes::copy_from_slice(&buf[..n])));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                let _ = stderr_tx.send(Err(e));
            }
        }

        // The done-file, not `channel.eof()`, is this loop's real signal for
        // "the script itself returned": a backgrounded descendant (e.g.
        // `sleep 10 &`) inherits the same channel's stdio and keeps it open
        // long after the script's own `wait $pid` (in
        // `build_remote_command`) has already returned, exactly the gap
        // `local.rs`'s `child.wait()` (decoupled from pipe closure) avoids.
        if natural_exit_code.is_none() && last_poll.elapsed() >= DONE_POLL_INTERVAL {
            last_poll = Instant::now();
            natural_exit_code = poll_remote_done(session, &donefile);
        }

        if natural_exit_code.is_some() || channel.eof() {
            break;
        }
        if Instant::now() >= deadline {
            killed_reason = Some(EXIT_CODE_TIMEOUT);
            break;
        }
        if kill_flag.load(Ordering::SeqCst) {
            killed_reason = Some(EXIT_CODE_ABORTED);
            break;
        }
        if !made_progress {
            std::thread::sleep(Duration::from_millis(4));
        }
    }
    drop(abort_rx);

    // Called unconditionally, not only on the killed-reason path: the
    // script's own process may have exited cleanly (reflected in
    // `natural_exit_code`) while a background descendant it spawned is
    // still alive in the same remote process group. `spec.md` P1 requires
    // no descendant of the spawned shell to survive the call on either
    // runtime, and nothing else on the remote side ever reaps it.
    cleanup_remote_job(session, &pidfile, &donefile);

    let exit_code = killed_reason.or(natural_exit_code).unwrap_or_else(|| {
        let _ = retry_ssh(|| channel.wait_close());
        channel.exit_status().unwrap_or(-1)
    });
    let _ = channel.close();
    let _ = exit_tx.send(exit_code);
}

/// Best-effort read of the exit-status file `build_remote_command` writes
/// once `wait $pid` returns — i.e. once the script's own immediate process
/// has exited, independent of any backgrounded descendant. `None` covers
/// both "not finished yet" (file doesn't exist) and any transient SFTP
/// error; both are simply retried on the next poll.
fn poll_remote_done(session: &mut ssh2::Session, donefile: &str) -> Option<i32> {
    let bytes = read_remote_file(session, donefile).ok()?;
    String::from_utf8(bytes).ok()?.trim().parse().ok()
}

/// Best-effort: opens a fresh channel on the same session, sends SIGKILL to
/// the process group recorded in `pidfile`, and removes both scratch files.
/// Failure here is swallowed — the caller has already decided the exec is
/// over. Called once per exec, on every terminal path (§4.3 "double-dispose
/// is a no-op" applies here too: a group that already exited is simply not
/// signaled again by the OS).
fn cleanup_remote_job(session: &mut ssh2::Session, pidfile: &str, donefile: &str) {
    let Ok(mut channel) = retry_ssh(|| session.channel_session()) else {
        return;
    };
    let command = format!(
        "if [ -f '{pidfile}' ]; then kill -KILL -\"$(cat '{pidfile}')\" 2>/dev/null; fi; \
         rm -f '{pidfile}' '{donefile}'"
    );
    if retry_ssh(|| channel.exec(&command)).is_ok() {
        let _ = retry_ssh(|| channel.wait_close());
    }
}

/// Wraps `script` so that (a) it runs backgrounded behind `wait $pid`,
/// decoupling "the script itself returned" (written to `donefile`) from
/// "every descendant's stdio closed" the way `local.rs`'s `child.wait()`
/// is decoupled from pipe EOF; (b) the backgrounded job's own pid — which,
/// because `setsid` is the first exec in that job, is also its new
/// session/process-group id — is captured via `$!` and recorded in
/// `pidfile` for [`cleanup_remote_job`]; and (c) the script's bytes reach
/// the remote shell unescaped, by traveling as base64 rather than through
/// nested shell quoting.
fn build_remote_command(
    script: &str,
    cwd: &str,
    env: &HashMap<String, String>,
    niceness: Option<i32>,
    pidfile: &str,
    donefile: &str,
) -> String {
    let encoded = BASE64.encode(script.as_bytes());
    let nice_prefix = niceness
        .map(|n| format!("nice -n {n} "))
        .unwrap_or_default();
    let mut exports = String::new();
    for (key, value) in env {
        exports.push_str(&format!("export {}={}; ", shell_quote(key), shell_quote(value)));
    }
    format!(
        "sh -c 'cd {cwd} || exit 127; {exports}setsid {nice}bash -c \"$(echo {encoded} | base64 -d)\" & \
         pid=$!; echo $pid > {pidfile}; wait $pid; echo $? > {donefile}'",
        cwd = shell_quote(cwd),
        exports = exports,
        pidfile = shell_quote(pidfile),
        nice = nice_prefix,
        encoded = encoded,
        donefile = shell_quote(donefile),
    )
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[async_trait]
impl Runtime for RemoteRuntime {
    async fn exec(&self, request: ExecRequest) -> RuntimeResult<ExecHandle> {
        let ExecRequest {
            script,
            cwd,
            env,
            timeout,
            niceness,
            abort,
        } = request;

        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        // The session thread only ever polls this same `abort`, so firing
        // it is how both timeout-independent callers (the process
        // supervisor's file-cap kill) and `ExecHandle::kill_process_group`
        // reach into an in-flight remote exec.
        let kill_signal = abort.clone();

        self.tx
            .send(ActorMessage::Exec {
                script,
                cwd,
                env,
                timeout,
                niceness,
                abort,
                stdout_tx,
                stderr_tx,
                exit_tx,
            })
            .map_err(|_| RuntimeError::ChannelClosed)?;

        let stdout = StreamReader::new(tokio_stream::wrappers::UnboundedReceiverStream::new(stdout_rx));
        let stderr = StreamReader::new(tokio_stream::wrappers::UnboundedReceiverStream::new(stderr_rx));

        let killer: Arc<dyn Fn() -> RuntimeResult<()> + Send + Sync> = Arc::new(move || {
            kill_signal.fire();
            Ok(())
        });

        Ok(ExecHandle::new(
            Box::pin(stdout) as Pin<Box<dyn AsyncRead + Send>>,
            Box::pin(stderr) as Pin<Box<dyn AsyncRead + Send>>,
            exit_rx,
            killer,
        ))
    }

    async fn stat(&self, path: &str) -> RuntimeResult<FileStat> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(ActorMessage::Stat {
                path: path.to_string(),
                respond,
            })
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    async fn read_file(&self, path: &str) -> RuntimeResult<Vec<u8>> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(ActorMessage::ReadFile {
                path: path.to_string(),
                respond,
            })
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    async fn write_file(&self, path: &str, contents: Vec<u8>) -> RuntimeResult<()> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(ActorMessage::WriteFile {
                path: path.to_string(),
                contents,
                respond,
            })
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    async fn remove_file(&self, path: &str) -> RuntimeResult<()> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(ActorMessage::RemoveFile {
                path: path.to_string(),
                respond,
            })
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    fn normalize_path(&self, target: &str, base: &str) -> String {
        posix_path::normalize(target, base)
    }
}
