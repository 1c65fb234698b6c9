//! `stagehand diff [SERVICE]` — show unified diffs for what sync would write.

use anyhow::{Context, Result};
use clap::Args;

use stagehand_sync::{
    diff::{diff_plan, DiffChange},
    plan, SyncRequest,
};

use super::Globals;

/// Arguments for `stagehand diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Service to diff (default: `default_service`, or the only service).
    pub service: Option<String>,
}

impl DiffArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let config = globals.load_config()?;
        let service = config.service(self.service.as_deref())?;
        let request = SyncRequest::for_service(&config, service)?;

        let planned = plan(&request.source_root, &request.build_root, &request.exclusions)
            .with_context(|| format!("diff failed for '{}'", service.name))?;
        let diffs = diff_plan(&planned)
            .with_context(|| format!("diff failed for '{}'", service.name))?;

        if diffs.is_empty() {
            println!("No differences for '{}'.", service.name);
            return Ok(());
        }

        for diff in diffs {
            match diff.change {
                DiffChange::Mode => println!("mode changed: {}", diff.path.display()),
                DiffChange::Entry => println!("entry changed: {}", diff.path.display()),
                DiffChange::Deleted if diff.unified_diff.is_empty() => {
                    println!("deleted: {}", diff.path.display())
                }
                _ => {
                    print!("{}", diff.unified_diff);
                    if !diff.unified_diff.ends_with('\n') {
                        println!();
                    }
                }
            }
        }

        Ok(())
    }
}
