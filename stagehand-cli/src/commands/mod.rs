pub mod diff;
pub mod init;
pub mod lifecycle;
pub mod logs;
pub mod shell;
pub mod status;
pub mod sync;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};

use stagehand_core::{config, Console, ProjectConfig};
use stagehand_runtime::{ComposeContainers, ComposeLifecycle, Dispatcher};

/// Compose-backed dispatcher used by every command.
pub type ComposeDispatcher = Dispatcher<ComposeLifecycle, ComposeContainers>;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Globals {
    config: Option<PathBuf>,
    pub out: Console,
    pub err: Console,
}

impl Globals {
    pub fn new(config: Option<PathBuf>) -> Self {
        Self {
            config,
            out: Console::for_stdout(),
            err: Console::for_stderr(),
        }
    }

    pub fn load_config(&self) -> Result<ProjectConfig> {
        let config = match &self.config {
            Some(path) => config::load_at(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?,
            None => config::locate_and_load(None)
                .context("failed to load stagehand.yaml; run `stagehand init` to create one")?,
        };
        tracing::debug!(
            config = %config.config_path().display(),
            services = config.services.len(),
            "loaded project config",
        );
        Ok(config)
    }

    pub fn dispatcher(&self) -> Result<ComposeDispatcher> {
        Ok(Dispatcher::compose(self.load_config()?))
    }
}
