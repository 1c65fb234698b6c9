//! `stagehand up | down | restart | rebuild` — topology lifecycle.

use anyhow::{Context, Result};
use clap::Args;

use stagehand_core::Severity;

use super::{sync::print_failures, sync::print_sync, Globals};

/// Foreground/background choice shared by the lifecycle commands.
#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Stay attached to container output instead of detaching.
    #[arg(long)]
    pub attach: bool,
}

pub fn up(globals: &Globals, args: AttachArgs) -> Result<()> {
    let dispatcher = globals.dispatcher()?;
    dispatcher
        .up(!args.attach, &mut |synced| print_sync(&globals.out, synced))
        .map_err(|err| {
            print_failures(&globals.err, &err);
            err
        })
        .context("up failed")?;
    println!("{}", globals.out.render(Severity::Success, "topology is up"));
    Ok(())
}

pub fn restart(globals: &Globals, args: AttachArgs) -> Result<()> {
    let dispatcher = globals.dispatcher()?;
    dispatcher
        .restart(!args.attach, &mut |synced| print_sync(&globals.out, synced))
        .map_err(|err| {
            print_failures(&globals.err, &err);
            err
        })
        .context("restart failed")?;
    println!("{}", globals.out.render(Severity::Success, "topology restarted"));
    Ok(())
}

pub fn down(globals: &Globals) -> Result<()> {
    globals.dispatcher()?.down().context("down failed")?;
    println!("{}", globals.out.render(Severity::Success, "topology is down"));
    Ok(())
}

pub fn rebuild(globals: &Globals, args: AttachArgs) -> Result<()> {
    globals
        .dispatcher()?
        .rebuild(!args.attach)
        .context("rebuild failed")?;
    println!("{}", globals.out.render(Severity::Success, "topology rebuilt"));
    Ok(())
}
