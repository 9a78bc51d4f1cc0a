//! Entry point for the `shellcore-exec` binary: a thin CLI front end over
//! the sandboxed shell execution core, one tool call per invocation.

use clap::Parser;
use shellcore_cli::Cli;
use shellcore_cli::run_main;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    run_main(cli).await
}
