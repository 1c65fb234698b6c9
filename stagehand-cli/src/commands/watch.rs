//! `stagehand watch [SERVICE...]` — sync on change until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use stagehand_core::{ServiceName, Severity};
use stagehand_runtime::{
    watch::{self, WatchTarget},
    SyncOptions,
};

use super::{
    sync::{print_failures, print_sync},
    Globals,
};

/// Arguments for `stagehand watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Services to watch (default: all).
    pub services: Vec<String>,

    /// Sync only; never restart downstream services.
    #[arg(long)]
    pub no_restart: bool,
}

impl WatchArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let dispatcher = Arc::new(globals.dispatcher()?);
        let names: Vec<ServiceName> = self.services.into_iter().map(ServiceName::from).collect();
        let targets = WatchTarget::for_services(dispatcher.config(), &names)?;

        for target in &targets {
            println!(
                "{}",
                globals.out.render(
                    Severity::Step,
                    &format!("watching '{}' at {}", target.service, target.source_root.display())
                )
            );
        }
        println!("{}", globals.out.detail("·", "press Ctrl-C to stop"));

        let options = SyncOptions {
            dry_run: false,
            restart: !self.no_restart,
        };
        let (out, err) = (globals.out, globals.err);
        let on_burst = move |service: &ServiceName| {
            match dispatcher.sync(Some(service.as_str()), options) {
                Ok(synced) => print_sync(&out, &synced),
                // A failed burst is reported and watching continues.
                Err(e) => {
                    print_failures(&err, &e);
                    eprintln!("{}", err.render(Severity::Error, &e.to_string()));
                }
            }
        };

        watch::start_blocking(targets, on_burst).context("watch failed")
    }
}
