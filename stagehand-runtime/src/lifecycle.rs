//! Container topology lifecycle: bring up, tear down, rebuild, restart one.

use std::time::Duration;

use stagehand_core::{ProjectConfig, ServiceName};

use crate::compose::ComposeCommand;
use crate::process::{ProcessRunner, SystemRunner};
use crate::RuntimeError;

/// Lifecycle operations delegated to the container tooling.
pub trait LifecycleManager: Send + Sync {
    fn up(&self, detach: bool) -> Result<(), RuntimeError>;
    fn down(&self) -> Result<(), RuntimeError>;
    /// Rebuild images and recreate containers.
    fn rebuild(&self, detach: bool) -> Result<(), RuntimeError>;
    /// Restart exactly one service, giving up after `timeout`.
    fn restart_service(&self, service: &ServiceName, timeout: Duration) -> Result<(), RuntimeError>;
}

/// [`LifecycleManager`] backed by `compose` subcommands.
#[derive(Debug, Clone)]
pub struct ComposeLifecycle<R = SystemRunner> {
    compose: ComposeCommand,
    runner: R,
}

impl ComposeLifecycle<SystemRunner> {
    pub fn new(config: &ProjectConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: ProcessRunner> ComposeLifecycle<R> {
    pub fn with_runner(config: &ProjectConfig, runner: R) -> Self {
        Self {
            compose: ComposeCommand::from_config(config),
            runner,
        }
    }
}

fn up_args(detach: bool, build: bool) -> Vec<&'static str> {
    let mut args = vec!["up"];
    if build {
        args.push("--build");
    }
    if detach {
        args.push("-d");
    }
    args
}

impl<R: ProcessRunner> LifecycleManager for ComposeLifecycle<R> {
    fn up(&self, detach: bool) -> Result<(), RuntimeError> {
        let spec = self.compose.spec(up_args(detach, false)).interactive();
        self.runner.run_checked(&spec).map(drop)
    }

    fn down(&self) -> Result<(), RuntimeError> {
        let spec = self.compose.spec(["down"]).interactive();
        self.runner.run_checked(&spec).map(drop)
    }

    fn rebuild(&self, detach: bool) -> Result<(), RuntimeError> {
        let spec = self.compose.spec(up_args(detach, true)).interactive();
        self.runner.run_checked(&spec).map(drop)
    }

    fn restart_service(
        &self,
        service: &ServiceName,
        timeout: Duration,
    ) -> Result<(), RuntimeError> {
        let spec = self
            .compose
            .spec(["restart".to_string(), service.to_string()])
            .timeout(timeout);
        self.runner.run_checked(&spec)?;
        tracing::info!(service = %service, "service restarted");
        Ok(())
    }
}
