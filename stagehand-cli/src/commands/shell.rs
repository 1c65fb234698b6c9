//! `stagehand shell SERVICE`

use anyhow::{Context, Result};
use clap::Args;

use super::Globals;

/// Arguments for `stagehand shell`.
#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Running service to attach to.
    pub service: String,

    /// Program to run instead of `runtime.shell`.
    #[arg(long, value_name = "PROGRAM")]
    pub shell: Option<String>,
}

impl ShellArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        globals
            .dispatcher()?
            .shell(&self.service, self.shell.as_deref())
            .with_context(|| format!("shell into '{}' failed", self.service))
    }
}
