//! Pass-through access to running containers.

use stagehand_core::{ProjectConfig, ServiceName};

use crate::compose::ComposeCommand;
use crate::process::{ProcessRunner, SystemRunner};
use crate::RuntimeError;

/// Operations that stream a running container's I/O to the terminal.
pub trait ContainerRuntime: Send + Sync {
    /// Logs of one service, or of all when `service` is `None`.
    fn logs(
        &self,
        service: Option<&ServiceName>,
        follow: bool,
        tail: Option<usize>,
    ) -> Result<(), RuntimeError>;
    fn status(&self) -> Result<(), RuntimeError>;
    fn shell(&self, service: &ServiceName, shell: &str) -> Result<(), RuntimeError>;
}

/// [`ContainerRuntime`] backed by `compose logs|ps|exec`.
#[derive(Debug, Clone)]
pub struct ComposeContainers<R = SystemRunner> {
    compose: ComposeCommand,
    runner: R,
}

impl ComposeContainers<SystemRunner> {
    pub fn new(config: &ProjectConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: ProcessRunner> ComposeContainers<R> {
    pub fn with_runner(config: &ProjectConfig, runner: R) -> Self {
        Self {
            compose: ComposeCommand::from_config(config),
            runner,
        }
    }
}

impl<R: ProcessRunner> ContainerRuntime for ComposeContainers<R> {
    fn logs(
        &self,
        service: Option<&ServiceName>,
        follow: bool,
        tail: Option<usize>,
    ) -> Result<(), RuntimeError> {
        let mut args = vec!["logs".to_string()];
        if follow {
            args.push("-f".to_string());
        }
        if let Some(tail) = tail {
            args.push("--tail".to_string());
            args.push(tail.to_string());
        }
        if let Some(service) = service {
            args.push(service.to_string());
        }
        self.runner
            .run_checked(&self.compose.spec(args).interactive())
            .map(drop)
    }

    fn status(&self) -> Result<(), RuntimeError> {
        self.runner
            .run_checked(&self.compose.spec(["ps"]).interactive())
            .map(drop)
    }

    fn shell(&self, service: &ServiceName, shell: &str) -> Result<(), RuntimeError> {
        let spec = self
            .compose
            .spec(["exec".to_string(), service.to_string(), shell.to_string()])
            .interactive();
        self.runner.run_checked(&spec).map(drop)
    }
}
