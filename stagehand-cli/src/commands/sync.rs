//! `stagehand sync [SERVICE]` — mirror one service and restart it.

use anyhow::{Context, Result};
use clap::Args;

use stagehand_core::{Console, Severity};
use stagehand_runtime::{DispatchError, ServiceSync, SyncOptions};

use super::Globals;

/// Arguments for `stagehand sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Service to sync (default: `default_service`, or the only service).
    pub service: Option<String>,

    /// Show what would change without touching the build tree.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not restart the downstream service afterwards.
    #[arg(long)]
    pub no_restart: bool,
}

impl SyncArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let dispatcher = globals.dispatcher()?;
        let options = SyncOptions {
            dry_run: self.dry_run,
            restart: !self.no_restart,
        };

        match dispatcher.sync(self.service.as_deref(), options) {
            Ok(synced) => {
                print_sync(&globals.out, &synced);
                Ok(())
            }
            Err(err) => {
                print_failures(&globals.err, &err);
                Err(err).context("sync failed")
            }
        }
    }
}

/// Summary line plus one detail line per changed path.
pub fn print_sync(console: &Console, synced: &ServiceSync) {
    let report = &synced.report;
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    if report.is_noop() {
        println!(
            "{}",
            console.render(
                Severity::Success,
                &format!("{prefix}'{}' already in sync", synced.service)
            )
        );
    } else {
        let verb = if report.dry_run { "would sync" } else { "synced" };
        println!(
            "{}",
            console.render(
                Severity::Success,
                &format!(
                    "{prefix}'{}' {verb} ({} copied, {} deleted) in {}ms",
                    synced.service,
                    report.files_copied(),
                    report.files_deleted(),
                    report.elapsed.as_millis()
                )
            )
        );
        for path in &report.dirs_created {
            println!("{}", console.detail("+", &format!("{}/", path.display())));
        }
        for path in &report.copied {
            println!("{}", console.detail("✎", &path.display().to_string()));
        }
        for path in report.deleted.iter().chain(&report.dirs_removed) {
            println!("{}", console.detail("-", &path.display().to_string()));
        }
    }

    if let Some(restarted) = &synced.restarted {
        println!(
            "{}",
            console.render(Severity::Step, &format!("restarted '{restarted}'"))
        );
    }
}

/// Per-entry detail for a partial failure; other errors speak for themselves.
pub fn print_failures(console: &Console, err: &DispatchError) {
    if let DispatchError::PartialFailure { failures, .. } = err {
        for failure in failures {
            eprintln!(
                "{}",
                console.detail(
                    "✗",
                    &format!("{} ({}): {}", failure.path.display(), failure.op, failure.error)
                )
            );
        }
        eprintln!(
            "{}",
            console.render(
                Severity::Warn,
                "build tree may be inconsistent; no restart was triggered"
            )
        );
    }
}
