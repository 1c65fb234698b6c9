//! `stagehand init` — write a starter stagehand.yaml.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use stagehand_core::{config, Console, Severity};

/// Arguments for `stagehand init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project directory (default: current directory).
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Compose project name (default: the directory name).
    #[arg(long)]
    pub project: Option<String>,

    /// Name of the first service.
    #[arg(long, default_value = "app")]
    pub service: String,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let console = Console::for_stdout();
        let dir = std::fs::canonicalize(&self.dir).unwrap_or_else(|_| self.dir.clone());
        let project = match self.project {
            Some(project) => project,
            None => dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .context("cannot derive a project name; pass --project")?,
        };

        let path = dir.join(config::CONFIG_FILE);
        let created = config::scaffold_at(&dir, &project, &self.service)
            .with_context(|| format!("failed to write '{}'", path.display()))?;

        if created {
            println!(
                "{}",
                console.render(Severity::Success, &format!("created {}", path.display()))
            );
            println!(
                "{}",
                console.detail("→", "edit the service paths, then run `stagehand sync`")
            );
        } else {
            println!(
                "{}",
                console.render(
                    Severity::Info,
                    &format!("{} already exists; left untouched", path.display())
                )
            );
        }
        Ok(())
    }
}
