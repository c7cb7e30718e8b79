//! Tandem CLI - runs a planner agent and a coder agent back to back.
//!
//! The planner answers the user's prompt with a step-by-step plan grounded in
//! a shared document index; the coder turns that plan into code.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{index, run};
use config::TandemConfig;

/// Tandem - planner and coder agents over a shared document index
#[derive(Parser, Debug)]
#[command(name = "tandem", author, version, about)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Configuration file (replaces ./tandem.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the planner → coder pipeline on a prompt
    ///
    /// Provisions a document index (or reuses one), creates both agents,
    /// and prints the plan and the generated code.
    Run(run::RunArgs),

    /// Manage document indexes
    #[command(subcommand)]
    Index(index::IndexCommand),
}

fn parse_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = TandemConfig::discover_and_load(args.config.as_deref())?;

    let level = args.log_level.as_deref().or(config.log_level.as_deref()).unwrap_or("info");
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run(run_args) => run::execute(run_args, config).await,
        Command::Index(command) => index::execute(command, &config).await,
    }
}
