//! Stagehand — local dev orchestration with source → build tree sync.
//!
//! # Usage
//!
//! ```text
//! stagehand up [--attach]
//! stagehand down
//! stagehand restart [--attach]
//! stagehand rebuild [--attach]
//! stagehand logs [SERVICE] [-f] [--tail N]
//! stagehand status [--json] [--no-containers]
//! stagehand shell SERVICE [--shell PROGRAM]
//! stagehand sync [SERVICE] [--dry-run] [--no-restart]
//! stagehand diff [SERVICE]
//! stagehand watch [SERVICE...] [--no-restart]
//! stagehand init [DIR] [--project NAME] [--service NAME]
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::{
    diff::DiffArgs, init::InitArgs, lifecycle::AttachArgs, logs::LogsArgs, shell::ShellArgs,
    status::StatusArgs, sync::SyncArgs, watch::WatchArgs, Globals,
};
use stagehand_core::Severity;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "stagehand",
    version,
    about = "Mirror source trees into build trees and drive the local container topology",
    long_about = None,
)]
struct Cli {
    /// Path to stagehand.yaml (default: search upward from the current directory).
    #[arg(long, global = true, env = "STAGEHAND_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log debug detail to stderr (overridden by STAGEHAND_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every service, then start the topology.
    Up(AttachArgs),

    /// Stop and remove the topology.
    Down,

    /// Sync every service, then stop and start the topology.
    Restart(AttachArgs),

    /// Rebuild images and recreate containers.
    Rebuild(AttachArgs),

    /// Show container logs.
    Logs(LogsArgs),

    /// Show sync state per service and container status.
    Status(StatusArgs),

    /// Open an interactive shell in a running service.
    Shell(ShellArgs),

    /// Mirror one service's source tree into its build tree, then restart it.
    Sync(SyncArgs),

    /// Show unified diffs of what sync would change.
    Diff(DiffArgs),

    /// Re-sync services whenever their source trees change.
    Watch(WatchArgs),

    /// Write a starter stagehand.yaml.
    Init(InitArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let globals = Globals::new(cli.config);
    let result = match cli.command {
        Commands::Up(args) => commands::lifecycle::up(&globals, args),
        Commands::Down => commands::lifecycle::down(&globals),
        Commands::Restart(args) => commands::lifecycle::restart(&globals, args),
        Commands::Rebuild(args) => commands::lifecycle::rebuild(&globals, args),
        Commands::Logs(args) => args.run(&globals),
        Commands::Status(args) => args.run(&globals),
        Commands::Shell(args) => args.run(&globals),
        Commands::Sync(args) => args.run(&globals),
        Commands::Diff(args) => args.run(&globals),
        Commands::Watch(args) => args.run(&globals),
        Commands::Init(args) => args.run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", globals.err.render(Severity::Error, &format!("{err:#}")));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let fallback = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("STAGEHAND_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
