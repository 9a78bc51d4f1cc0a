//! Library half of the `shellcore-exec` binary: CLI parsing lives in
//! [`cli::Cli`], dispatch lives in [`run_main`]. Split the same way the
//! core crate's tool modules are, so the binary itself stays a thin
//! wrapper around `clap::Parser` + `tokio::main`.

pub mod cli;

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use shellcore_core::config::ToolConfiguration;
use shellcore_core::init::AlwaysReady;
use shellcore_core::runtime::AbortSignal;
use shellcore_core::runtime::LocalRuntime;
use shellcore_core::tools::bash;
use shellcore_core::tools::bash::BashArgs;
use shellcore_core::tools::file_edit;
use shellcore_core::tools::file_list;
use shellcore_core::tools::file_read;
use shellcore_core::tools::file_search;
use shellcore_core::tools::plan;
use shellcore_core::tools::plan::PlanStep;
use shellcore_core::tools::plan::PlanStepStatus;
use shellcore_core::tools::status;
use shellcore_core::tools::todo;
use shellcore_core::tools::todo::TodoItem;
use shellcore_core::tools::todo::TodoStatus;

pub use cli::Cli;
pub use cli::Command;

pub async fn run_main(cli: Cli) -> Result<()> {
    let cwd = cli
        .cwd
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)
        .context("resolving workspace root")?;
    let runtime_temp_dir = cli
        .runtime_temp_dir
        .unwrap_or_else(std::env::temp_dir)
        .to_string_lossy()
        .to_string();

    let config = ToolConfiguration::new(
        cwd,
        Arc::new(LocalRuntime::new()),
        "shellcore-exec",
        Arc::new(AlwaysReady),
        runtime_temp_dir,
    );

    match cli.command {
        Command::Bash {
            script,
            timeout_secs,
            truncate,
        } => {
            let mut config = config;
            if truncate {
                config.overflow_policy = shellcore_core::config::OverflowPolicy::Truncate;
            }
            let result = bash::bash(&config, BashArgs { script, timeout_secs }, AbortSignal::new()).await;
            print_json(&result)
        }
        Command::FileRead { path, offset, limit } => {
            print_tool_result(file_read::file_read(&config, &path, offset, limit).await)
        }
        Command::EditReplaceString {
            path,
            old_string,
            new_string,
            replace_count,
        } => print_tool_result(
            file_edit::replace_string(&config, &path, &old_string, &new_string, replace_count).await,
        ),
        Command::EditReplaceLines {
            path,
            start_line,
            end_line,
            new_lines,
        } => print_tool_result(
            file_edit::replace_lines(&config, &path, start_line, end_line, new_lines, None).await,
        ),
        Command::EditInsert {
            path,
            line_offset,
            content,
            create,
        } => print_tool_result(file_edit::insert(&config, &path, line_offset, &content, create).await),
        Command::Search {
            path,
            pattern,
            context_lines,
            max_results,
        } => print_tool_result(
            file_search::file_search(&config, &path, &pattern, context_lines, max_results).await,
        ),
        Command::List {
            path,
            max_depth,
            pattern,
            gitignore,
            max_entries,
        } => print_tool_result(
            file_list::file_list(&config, &path, max_depth, pattern.as_deref(), gitignore, max_entries)
                .await,
        ),
        Command::TodoRead => print_json(&todo::todo_read(&config).await),
        Command::TodoWrite { items } => {
            let todos = items
                .iter()
                .map(|raw| parse_todo_item(raw))
                .collect::<Result<Vec<_>>>()?;
            print_json(&todo::todo_write(&config, todos).await)
        }
        Command::TodoClear => print_json(&todo::todo_clear(&config).await),
        Command::StatusSet { emoji, message } => print_json(&status::status_set(&emoji, &message)),
        Command::ProposePlan { explanation, plan: steps } => {
            let steps = steps
                .iter()
                .map(|raw| parse_plan_step(raw))
                .collect::<Result<Vec<_>>>()?;
            print_json(&plan::propose_plan(plan::ProposePlanArgs {
                explanation,
                plan: steps,
            }))
        }
        Command::CompactSummary { summary } => {
            print_json(&plan::compact_summary(plan::CompactSummaryArgs { summary }))
        }
    }
}

fn parse_todo_item(raw: &str) -> Result<TodoItem> {
    let (content, status) = raw
        .rsplit_once(':')
        .with_context(|| format!("`{raw}` is not `<content>:<status>`"))?;
    let status = match status {
        "pending" => TodoStatus::Pending,
        "in_progress" => TodoStatus::InProgress,
        "completed" => TodoStatus::Completed,
        other => anyhow::bail!("unknown status `{other}`; expected pending, in_progress, or completed"),
    };
    Ok(TodoItem {
        content: content.to_string(),
        status,
    })
}

fn parse_plan_step(raw: &str) -> Result<PlanStep> {
    let (step, status) = raw
        .rsplit_once(':')
        .with_context(|| format!("`{raw}` is not `<step>:<status>`"))?;
    let status = match status {
        "pending" => PlanStepStatus::Pending,
        "in_progress" => PlanStepStatus::InProgress,
        "completed" => PlanStepStatus::Completed,
        other => anyhow::bail!("unknown status `{other}`; expected pending, in_progress, or completed"),
    };
    Ok(PlanStep {
        step: step.to_string(),
        status,
    })
}

fn print_tool_result<T: serde::Serialize>(result: std::result::Result<T, String>) -> Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(error) => print_json(&serde_json::json!({ "success": false, "error": error })),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
