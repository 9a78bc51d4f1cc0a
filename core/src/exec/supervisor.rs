//! Process supervisor (C3, §4.3).
//!
//! Spawns the shell through the runtime, force-closes stdin, routes
//! stdout/stderr through the [`Accountant`](super::accountant::Accountant),
//! and turns the race between natural exit, timeout, abort, and
//! file-truncation into one of four terminal outcomes.

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use super::accountant::Accountant;
use super::accountant::AccountingLimits;
use crate::error::EXIT_CODE_ABORTED;
use crate::error::EXIT_CODE_TIMEOUT;
use crate::error::RuntimeResult;
use crate::runtime::AbortSignal;
use crate::runtime::ExecRequest;
use crate::runtime::Runtime;
use crate::runtime::editor_blocker_env;

/// Grace period after `exitCode` resolves, to let already-in-flight line
/// reads land before readers are torn down (§4.3).
const COMPLETION_GRACE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Aborted,
    TimedOut,
    FileTruncated,
    Exited,
}

pub struct SupervisedRun {
    pub outcome: Outcome,
    pub exit_code: i32,
    pub wall_duration_ms: u64,
    pub accountant: Accountant,
}

/// A script that fails a precheck never reaches the runtime; all prechecks
/// report `exitCode = -1` and `wall_duration_ms = 0` (§4.3).
#[derive(Debug, Clone)]
pub enum PrecheckError {
    EmptyScript,
    LeadingSleep,
    RedundantCd { path: String },
}

impl PrecheckError {
    pub fn message(&self, cwd: &str) -> String {
        match self {
            PrecheckError::EmptyScript => {
                "Script parameter is empty. This likely indicates a malformed tool call.".to_string()
            }
            PrecheckError::LeadingSleep => {
                "Do not start commands with sleep; it wastes wall clock. Use a polling loop \
                 instead (e.g. `while ! cond; do sleep 1; done`); sleeping inside a loop is fine."
                    .to_string()
            }
            PrecheckError::RedundantCd { path } => {
                format!(
                    "Redundant `cd {path}`: the working directory is already `{cwd}`. Drop the \
                     leading cd."
                )
            }
        }
    }
}

/// Runs the three prechecks in order (§4.3). `runtime`/`cwd` are needed only
/// for the redundant-cd check, which must resolve the target path the same
/// way the runtime would.
pub fn precheck(script: &str, cwd: &str, runtime: &dyn Runtime) -> Result<(), PrecheckError> {
    if script.trim().is_empty() {
        return Err(PrecheckError::EmptyScript);
    }
    if starts_with_sleep(script) {
        return Err(PrecheckError::LeadingSleep);
    }
    if let Some(path) = leading_cd_target(script) {
        if runtime.normalize_path(&path, cwd) == runtime.normalize_path(".", cwd) {
            return Err(PrecheckError::RedundantCd { path });
        }
    }
    Ok(())
}

fn starts_with_sleep(script: &str) -> bool {
    let trimmed = script.trim_start();
    match trimmed.strip_prefix("sleep") {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

/// Parses a leading `cd <path>` (optionally quoted) immediately followed by
/// a `;`, `&`, or `|` separator; returns the unquoted path if the shape
/// matches. Anything else (no leading cd, no separator, `cd` mid-script)
/// returns `None`.
fn leading_cd_target(script: &str) -> Option<String> {
    let after_cd = script.trim_start().strip_prefix("cd")?;
    let mut rest = after_cd;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest = rest.trim_start();

    let (path, after_path) = match rest.chars().next() {
        Some(quote @ ('\'' | '"')) => {
            let closing = rest[1..].find(quote)? + 1;
            (rest[1..closing].to_string(), &rest[closing + 1..])
        }
        _ => {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            (rest[..end].to_string(), &rest[end..])
        }
    };

    let after_path = after_path.trim_start();
    match after_path.chars().next() {
        Some(';') | Some('&') | Some('|') => Some(path),
        _ => None,
    }
}

/// Truncates a script to a safe-to-log prefix. The full script may carry
/// secret values via `$VAR` expansion the caller injected, so only a short
/// prefix is ever logged, never the full body.
const LOGGED_SCRIPT_PREFIX_LEN: usize = 80;

fn script_prefix_for_log(script: &str) -> String {
    let mut prefix: String = script.chars().take(LOGGED_SCRIPT_PREFIX_LEN).collect();
    if prefix.chars().count() < script.chars().count() {
        prefix.push('…');
    }
    prefix
}

/// Executes one already-prechecked bash call end to end.
pub async fn run(
    runtime: &dyn Runtime,
    workspace_id: &str,
    cwd: &str,
    script: &str,
    secrets: &HashMap<String, String>,
    timeout: Duration,
    niceness: Option<i32>,
    abort: AbortSignal,
    limits: AccountingLimits,
) -> RuntimeResult<SupervisedRun> {
    let start = Instant::now();
    tracing::debug!(
        workspace_id,
        script_prefix = %script_prefix_for_log(script),
        timeout_secs = timeout.as_secs(),
        "bash: spawning"
    );

    let mut env = secrets.clone();
    env.extend(editor_blocker_env());

    let handle = match runtime
        .exec(ExecRequest {
            script: script.to_string(),
            cwd: cwd.to_string(),
            env,
            timeout,
            niceness,
            abort,
        })
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(workspace_id, error = %e, "bash: spawn failed");
            return Err(e);
        }
    };

    let mut accountant = Accountant::new(limits);
    let killer = handle.killer();

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    spawn_line_reader(handle.stdout, line_tx.clone());
    spawn_line_reader(handle.stderr, line_tx.clone());
    drop(line_tx);

    let mut exit_code: Option<i32> = None;
    let mut file_truncated = false;
    let mut lines_done = false;
    let mut exit_rx = handle.exit_rx;

    // Waits on `exitCode`, not on the stdout/stderr streams closing: a
    // backgrounded child the script itself spawns (e.g. `sleep 30 &`) keeps
    // its inherited copy of the stdout/stderr pipes open long after the
    // shell leader exits, so waiting for those pipes to reach EOF here
    // would block on the background job finishing on its own. Once
    // `exitCode` resolves the loop exits immediately; the grace window
    // below picks up whatever is already buffered, and the unconditional
    // kill that follows is what actually reclaims the background job.
    loop {
        if file_truncated || exit_code.is_some() {
            break;
        }
        tokio::select! {
            maybe_line = line_rx.recv(), if !lines_done => {
                match maybe_line {
                    Some(line) => {
                        if accountant.ingest_line(&line) {
                            file_truncated = true;
                        }
                    }
                    None => {
                        lines_done = true;
                    }
                }
            }
            code = &mut exit_rx, if exit_code.is_none() => {
                exit_code = Some(code.unwrap_or(EXIT_CODE_ABORTED));
            }
        }
    }

    // The process group is signaled exactly once on every terminal path,
    // not only when the natural exit hasn't resolved: the shell itself may
    // have exited cleanly while a background job it spawned (e.g. `sleep
    // 30 &`) is still alive in the same group, and P1 requires that no
    // descendant of the spawned shell survives past this call returning.
    let _ = killer();

    // Drain whatever arrived in the grace window, then stop listening.
    let grace_deadline = Instant::now() + COMPLETION_GRACE;
    while Instant::now() < grace_deadline {
        match line_rx.try_recv() {
            Ok(line) => {
                if accountant.ingest_line(&line) {
                    file_truncated = true;
                    let _ = killer();
                    break;
                }
            }
            Err(mpsc::error::TryRecvError::Empty) => {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Err(mpsc::error::TryRecvError::Disconnected) => break,
        }
    }

    let exit_code = exit_code.unwrap_or(EXIT_CODE_ABORTED);
    let outcome = if file_truncated {
        Outcome::FileTruncated
    } else if exit_code == EXIT_CODE_ABORTED {
        Outcome::Aborted
    } else if exit_code == EXIT_CODE_TIMEOUT {
        Outcome::TimedOut
    } else {
        Outcome::Exited
    };

    let wall_duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Outcome::Exited if exit_code == 0 => {
            tracing::debug!(workspace_id, exit_code, wall_duration_ms, "bash: exited");
        }
        Outcome::Exited => {
            tracing::warn!(workspace_id, exit_code, wall_duration_ms, "bash: exited non-zero");
        }
        Outcome::FileTruncated | Outcome::TimedOut | Outcome::Aborted => {
            tracing::warn!(workspace_id, ?outcome, exit_code, wall_duration_ms, "bash: terminated early");
        }
    }

    Ok(SupervisedRun {
        outcome,
        exit_code,
        wall_duration_ms,
        accountant,
    })
}

fn spawn_line_reader(
    stream: std::pin::Pin<Box<dyn tokio::io::AsyncRead + Send>>,
    tx: mpsc::UnboundedSender<String>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::runtime::LocalRuntime;

    #[test]
    fn empty_script_is_rejected() {
        let runtime = LocalRuntime::new();
        assert!(matches!(precheck("   ", "/workspace", &runtime), Err(PrecheckError::EmptyScript)));
    }

    #[test]
    fn leading_sleep_is_rejected() {
        let runtime = LocalRuntime::new();
        assert!(matches!(
            precheck("sleep 5", "/workspace", &runtime),
            Err(PrecheckError::LeadingSleep)
        ));
        assert!(matches!(
            precheck("  sleep 5 && echo hi", "/workspace", &runtime),
            Err(PrecheckError::LeadingSleep)
        ));
    }

    #[test]
    fn sleep_inside_a_loop_is_permitted() {
        let runtime = LocalRuntime::new();
        assert!(precheck("while true; do sleep 1; done", "/workspace", &runtime).is_ok());
    }

    #[test]
    fn sleep_prefixed_word_is_not_a_false_positive() {
        let runtime = LocalRuntime::new();
        assert!(precheck("sleepy-cmd --now", "/workspace", &runtime).is_ok());
    }

    #[test]
    fn redundant_cd_to_cwd_is_rejected() {
        let runtime = LocalRuntime::new();
        assert!(matches!(
            precheck("cd /workspace && echo x", "/workspace", &runtime),
            Err(PrecheckError::RedundantCd { .. })
        ));
        assert!(matches!(
            precheck("cd '/workspace' ; echo x", "/workspace", &runtime),
            Err(PrecheckError::RedundantCd { .. })
        ));
    }

    #[test]
    fn cd_to_a_different_directory_is_permitted() {
        let runtime = LocalRuntime::new();
        assert!(precheck("cd /workspace/sub && echo x", "/workspace", &runtime).is_ok());
    }

    #[test]
    fn cd_without_a_separator_is_not_matched() {
        let runtime = LocalRuntime::new();
        assert!(precheck("cd /workspace", "/workspace", &runtime).is_ok());
    }

    /// S1: a trivial command exits cleanly with its stdout collected.
    #[tokio::test]
    async fn s1_echo_hello_succeeds() {
        let runtime = LocalRuntime::new();
        let run = run(
            &runtime,
            "ws",
            "/tmp",
            "echo hello",
            &HashMap::new(),
            Duration::from_secs(5),
            None,
            AbortSignal::new(),
            AccountingLimits::tmpfile_policy(),
        )
        .await
        .expect("local exec should not fail");
        assert_eq!(run.outcome, Outcome::Exited);
        assert_eq!(run.exit_code, 0);
        assert_eq!(run.accountant.collected_output(), "hello");
    }

    /// P4 / timeout path: a command that outlives its timeout budget is
    /// killed and reported as `TimedOut`, well inside the timeout + grace.
    #[tokio::test]
    async fn timeout_kills_the_command_and_reports_timed_out() {
        let runtime = LocalRuntime::new();
        let started = Instant::now();
        let run = run(
            &runtime,
            "ws",
            "/tmp",
            "sleep 30",
            &HashMap::new(),
            Duration::from_millis(200),
            None,
            AbortSignal::new(),
            AccountingLimits::tmpfile_policy(),
        )
        .await
        .expect("local exec should not fail");
        assert_eq!(run.outcome, Outcome::TimedOut);
        assert_eq!(run.exit_code, EXIT_CODE_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// P4: firing the abort signal mid-run surfaces `Aborted`, not a
    /// natural exit code.
    #[tokio::test]
    async fn abort_signal_stops_the_command_and_reports_aborted() {
        let runtime = LocalRuntime::new();
        let abort = AbortSignal::new();
        let abort_for_fire = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            abort_for_fire.fire();
        });
        let run = run(
            &runtime,
            "ws",
            "/tmp",
            "sleep 30",
            &HashMap::new(),
            Duration::from_secs(30),
            None,
            abort,
            AccountingLimits::tmpfile_policy(),
        )
        .await
        .expect("local exec should not fail");
        assert_eq!(run.outcome, Outcome::Aborted);
        assert_eq!(run.exit_code, EXIT_CODE_ABORTED);
    }

    /// P3: a single overlong line trips file truncation and kills the
    /// process group; the offending line never lands in the collected
    /// output.
    #[tokio::test]
    async fn overlong_line_triggers_file_truncation_and_kills_the_group() {
        let runtime = LocalRuntime::new();
        let too_long = AccountingLimits::tmpfile_policy().max_line_bytes.unwrap() + 1;
        let script = format!(
            "printf -v line '%*s' {too_long} ''; printf '%s\\n' \"${{line// /x}}\""
        );
        let run = run(
            &runtime,
            "ws",
            "/tmp",
            &script,
            &HashMap::new(),
            Duration::from_secs(5),
            None,
            AbortSignal::new(),
            AccountingLimits::tmpfile_policy(),
        )
        .await
        .expect("local exec should not fail");
        assert_eq!(run.outcome, Outcome::FileTruncated);
        assert!(run.accountant.collected_output().is_empty());
    }

    /// S4 / P1: a background process the script itself spawns is reaped
    /// once the supervisor returns, even though the shell's own stdout
    /// closed (and the command exited 0) before the background job did.
    #[tokio::test]
    async fn background_process_does_not_outlive_the_call() {
        let runtime = LocalRuntime::new();
        let run = run(
            &runtime,
            "ws",
            "/tmp",
            "sleep 30 & echo $!",
            &HashMap::new(),
            Duration::from_secs(5),
            None,
            AbortSignal::new(),
            AccountingLimits::tmpfile_policy(),
        )
        .await
        .expect("local exec should not fail");
        assert_eq!(run.outcome, Outcome::Exited);
        let pid: i32 = run
            .accountant
            .collected_output()
            .trim()
            .parse()
            .expect("output should be the background pid");

        tokio::time::sleep(Duration::from_millis(300)).await;
        // Signal 0 only probes whether the pid is alive; ESRCH means the
        // background job (and the process group that held it) is gone.
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive, "background process {pid} should have been reaped");
    }
}
