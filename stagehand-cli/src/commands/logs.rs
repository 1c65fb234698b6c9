//! `stagehand logs [SERVICE]`

use anyhow::{Context, Result};
use clap::Args;

use super::Globals;

/// Arguments for `stagehand logs`.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Limit output to one service.
    pub service: Option<String>,

    /// Keep streaming new output.
    #[arg(long, short)]
    pub follow: bool,

    /// Number of lines to show from the end of each log.
    #[arg(long, value_name = "N")]
    pub tail: Option<usize>,
}

impl LogsArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        globals
            .dispatcher()?
            .logs(self.service.as_deref(), self.follow, self.tail)
            .context("logs failed")
    }
}
