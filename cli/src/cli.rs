use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

/// Drives the sandboxed shell execution core from a terminal, one tool
/// call per invocation. Every subcommand maps directly onto a tool from
/// the fixed tool surface; JSON in, JSON out.
#[derive(Parser, Debug)]
#[command(name = "shellcore-exec", version)]
pub struct Cli {
    /// Workspace root. Defaults to the current directory.
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Directory used for todos.json and bash overflow files. Defaults to
    /// the system temp directory.
    #[arg(long, global = true)]
    pub runtime_temp_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a shell script under the bash tool's full policy: prechecks,
    /// output accounting, timeout, and overflow handling.
    Bash {
        script: String,
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Return inline truncated output instead of writing an overflow
        /// file (the `truncate` overflow policy).
        #[arg(long)]
        truncate: bool,
    },
    /// Read a file with an optional 1-based offset/limit window.
    FileRead {
        path: String,
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Replace occurrences of a literal string in a file.
    EditReplaceString {
        path: String,
        old_string: String,
        new_string: String,
        /// -1 replaces every occurrence; default 1.
        #[arg(long)]
        replace_count: Option<i64>,
    },
    /// Replace an inclusive line range with new content.
    EditReplaceLines {
        path: String,
        start_line: usize,
        end_line: usize,
        /// One `new_lines` entry per `--line` flag, in order.
        #[arg(long = "line")]
        new_lines: Vec<String>,
    },
    /// Insert content after a given line (0 = top of file).
    EditInsert {
        path: String,
        line_offset: usize,
        content: String,
        #[arg(long)]
        create: bool,
    },
    /// Search a file for a literal substring, with surrounding context.
    Search {
        path: String,
        pattern: String,
        #[arg(long)]
        context_lines: Option<usize>,
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// List a directory, gitignore-aware, directories before files.
    List {
        #[arg(default_value = ".")]
        path: String,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long, default_value_t = true)]
        gitignore: bool,
        #[arg(long)]
        max_entries: Option<usize>,
    },
    /// Print the persisted TODO list.
    TodoRead,
    /// Replace the persisted TODO list. Pass `content:status` pairs, e.g.
    /// `ship the fix:in_progress`.
    TodoWrite {
        /// `<content>:<pending|in_progress|completed>`
        items: Vec<String>,
    },
    /// Delete the persisted TODO list.
    TodoClear,
    /// Validate and echo a one-emoji status ping.
    StatusSet { emoji: String, message: String },
    /// Propose a structured plan; a tool host renders it as a live plan
    /// view. Nothing is persisted.
    ProposePlan {
        #[arg(long)]
        explanation: Option<String>,
        /// `<step>:<pending|in_progress|completed>`, one per `--step` flag.
        #[arg(long = "step")]
        plan: Vec<String>,
    },
    /// Acknowledge a context-compaction summary the caller wants recorded
    /// in the conversation history. Nothing is persisted.
    CompactSummary { summary: String },
}
