//! Bash tool (C4, §4.4): policy layer over C2 (accounting) + C3
//! (supervision) + the overflow-policy decision of what to do once output
//! is truncated.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use super::await_init;
use crate::config::OverflowPolicy;
use crate::config::ToolConfiguration;
use crate::error::WRITE_DENIED_PREFIX;
use crate::exec;
use crate::exec::AccountingLimits;
use crate::exec::Outcome;
use crate::exec::SupervisedRun;
use crate::runtime::AbortSignal;

pub const BASH_DEFAULT_TIMEOUT_SECS: u64 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct BashArgs {
    pub script: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TruncatedDescriptor {
    pub reason: String,
    pub total_lines: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BashResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exit_code: i32,
    pub wall_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<TruncatedDescriptor>,
}

impl BashResult {
    fn reject(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            exit_code: -1,
            wall_duration_ms: 0,
            truncated: None,
        }
    }
}

pub async fn bash(config: &ToolConfiguration, args: BashArgs, abort: AbortSignal) -> BashResult {
    await_init(config).await;

    let cwd = config.cwd.to_string_lossy().to_string();
    let runtime = config.runtime.as_ref();

    if let Err(err) = exec::precheck(&args.script, &cwd, runtime) {
        return BashResult::reject(err.message(&cwd));
    }

    let timeout_secs = args.timeout_secs.unwrap_or(BASH_DEFAULT_TIMEOUT_SECS);
    let timeout = Duration::from_secs(timeout_secs);
    let limits = match config.overflow_policy {
        OverflowPolicy::Tmpfile => AccountingLimits::tmpfile_policy(),
        OverflowPolicy::Truncate => AccountingLimits::truncate_policy(),
    };
    let niceness = config.niceness.map(crate::config::Niceness::get);

    let run = match exec::run(
        runtime,
        &config.workspace_id,
        &cwd,
        &args.script,
        &config.secrets,
        timeout,
        niceness,
        abort,
        limits,
    )
    .await
    {
        Ok(run) => run,
        Err(e) => return BashResult::reject(e.to_string()),
    };

    match run.outcome {
        Outcome::Aborted => BashResult {
            success: false,
            output: None,
            error: Some("Command execution was aborted".to_string()),
            exit_code: -1,
            wall_duration_ms: run.wall_duration_ms,
            truncated: None,
        },
        Outcome::TimedOut => BashResult {
            success: false,
            output: None,
            error: Some(format!("Command exceeded timeout of {timeout_secs} seconds")),
            exit_code: -1,
            wall_duration_ms: run.wall_duration_ms,
            truncated: None,
        },
        Outcome::FileTruncated => handle_overflow(config, &run).await,
        Outcome::Exited if run.accountant.is_display_truncated() => {
            handle_overflow(config, &run).await
        }
        Outcome::Exited if run.exit_code == 0 => BashResult {
            success: true,
            output: Some(run.accountant.collected_output()),
            error: None,
            exit_code: 0,
            wall_duration_ms: run.wall_duration_ms,
            truncated: None,
        },
        Outcome::Exited => BashResult {
            success: false,
            output: Some(run.accountant.collected_output()),
            error: Some(format!("Command exited with code {}", run.exit_code)),
            exit_code: run.exit_code,
            wall_duration_ms: run.wall_duration_ms,
            truncated: None,
        },
    }
}

fn human_overflow_phrase(reason: &str) -> &'static str {
    if reason.contains("line count") {
        "Line count exceeded"
    } else if reason.contains("per-line limit") {
        "a single line exceeded the per-line byte limit"
    } else {
        "Output size limit exceeded"
    }
}

async fn handle_overflow(config: &ToolConfiguration, run: &SupervisedRun) -> BashResult {
    let truncation = run
        .accountant
        .file_truncation()
        .or_else(|| run.accountant.display_truncation());
    let reason = truncation.map(|t| t.reason.clone()).unwrap_or_default();
    let total_lines = run.accountant.lines().len();

    match config.overflow_policy {
        OverflowPolicy::Truncate => BashResult {
            success: run.exit_code == 0,
            output: Some(run.accountant.collected_output()),
            error: if run.exit_code == 0 {
                None
            } else {
                Some(format!("Command exited with code {}", run.exit_code))
            },
            exit_code: run.exit_code,
            wall_duration_ms: run.wall_duration_ms,
            truncated: Some(TruncatedDescriptor { reason, total_lines }),
        },
        OverflowPolicy::Tmpfile => {
            let file_name = format!("bash-{}.txt", &Uuid::new_v4().simple().to_string()[..8]);
            let path = format!(
                "{}/{file_name}",
                config.runtime_temp_dir.trim_end_matches('/')
            );
            let body = run.accountant.collected_output();
            if let Err(e) = config.runtime.write_file(&path, body.into_bytes()).await {
                return BashResult {
                    success: false,
                    output: None,
                    error: Some(format!("{WRITE_DENIED_PREFIX}{e}")),
                    // Tool-level failure, not the script's own exit status (§6
                    // "Exit code conventions"): truncation under the
                    // `tmpfile` policy is reported as `-1` even when the
                    // script itself ran to a clean natural exit.
                    exit_code: -1,
                    wall_duration_ms: run.wall_duration_ms,
                    truncated: None,
                };
            }
            let phrase = human_overflow_phrase(&reason);
            BashResult {
                success: false,
                output: None,
                error: Some(format!(
                    "[OUTPUT OVERFLOW: {phrase}] Output ({total_lines} lines) exceeded the limits \
                     for this response and was written in full to {path}. Use file_read with \
                     offset/limit or file_search against that path to inspect specific sections \
                     instead of re-running this command."
                )),
                exit_code: -1,
                wall_duration_ms: run.wall_duration_ms,
                truncated: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use std::sync::Arc;

    use super::*;
    use crate::init::AlwaysReady;
    use crate::runtime::LocalRuntime;

    #[test]
    fn default_timeout_is_three_seconds() {
        assert_eq!(BASH_DEFAULT_TIMEOUT_SECS, 3);
    }

    #[test]
    fn overflow_phrase_recognizes_line_count_reason() {
        assert_eq!(human_overflow_phrase("exceeded line count"), "Line count exceeded");
    }

    /// S2: a script whose natural exit is 0 still reports `exit_code: -1`
    /// once its output overflows under the `tmpfile` policy — the overflow
    /// is a tool-level failure (§6 "Exit code conventions"), not the
    /// script's own exit status.
    #[tokio::test]
    async fn s2_line_count_overflow_reports_tool_level_exit_code() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = ToolConfiguration::new(
            std::env::temp_dir(),
            Arc::new(LocalRuntime::new()),
            "ws",
            Arc::new(AlwaysReady),
            temp_dir.path().to_string_lossy().to_string(),
        );

        let result = bash(
            &config,
            BashArgs {
                script: "for i in {1..400}; do echo line$i; done".to_string(),
                timeout_secs: Some(5),
            },
            AbortSignal::new(),
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        let error = result.error.expect("overflow must report an error");
        assert!(error.contains("[OUTPUT OVERFLOW"));
        assert!(error.contains("Line count exceeded"));
    }
}
