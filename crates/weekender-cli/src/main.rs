//! Weekender CLI — a cheerful weekend helper backed by MCP tools.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead};
use std::sync::Arc;
use tokio::sync::mpsc;
use weekender_config::{CliOverrides, WeekenderConfig};
use weekender_core::{Dispatcher, KeywordDecider};
use weekender_mcp::Connection;

#[derive(Parser)]
#[command(
    name = "weekender",
    version,
    about = "A cheerful weekend helper that calls MCP tools"
)]
struct Cli {
    /// Path of the MCP server script to launch (default: server_fun.py)
    server_path: Option<String>,

    /// Interpreter used to run the server script (default: python)
    #[arg(long)]
    python: Option<String>,

    /// Give up on a tool call after this many milliseconds
    #[arg(long)]
    call_timeout_ms: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = WeekenderConfig::load(CliOverrides {
        server_path: cli.server_path,
        python: cli.python,
        call_timeout_ms: cli.call_timeout_ms,
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut conn = Connection::open(&config.server).await.with_context(|| {
        format!(
            "Failed to connect to MCP server `{} {}`",
            config.server.command,
            config.server.args.join(" ")
        )
    })?;

    println!("Connected tools: {:?}", conn.tool_names());

    let outcome = repl(&mut conn).await;
    conn.close().await;
    outcome
}

/// Run the interactive loop until exit, end of input, or Ctrl+C.
async fn repl(conn: &mut Connection) -> Result<()> {
    let mut lines = spawn_stdin_reader();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut dispatcher = Dispatcher::new(conn.session_mut(), Arc::new(KeywordDecider));
    tokio::select! {
        result = dispatcher.run_lines(&mut lines, &mut out) => result.context("Failed to write output"),
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("interrupted, shutting down");
            Ok(())
        }
    }
}

/// Read stdin on a plain OS thread. The runtime never waits on it at
/// shutdown, so an interrupted prompt does not keep the process alive.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {e}");
                    break;
                }
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
