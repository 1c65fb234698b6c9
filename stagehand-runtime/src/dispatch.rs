//! Subcommand dispatch: sync-then-restart, and lifecycle delegation.
//!
//! ## Restart gating
//!
//! A downstream restart is triggered only after a sync that finished with
//! no failed entries. `SourceUnavailable` and `PartialFailure` return before
//! any lifecycle call is made. `up` and `restart` sync every configured
//! service first and abort on the first failure.

use stagehand_core::{ProjectConfig, ServiceConfig, ServiceName};
use stagehand_sync::{
    lock::RunLock,
    state::{self, SyncRecord},
    sync_tree, SyncError, SyncReport, SyncRequest,
};

use crate::containers::{ComposeContainers, ContainerRuntime};
use crate::lifecycle::{ComposeLifecycle, LifecycleManager};
use crate::DispatchError;

/// Knobs of a single `sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Report what would change; never mutate or restart.
    pub dry_run: bool,
    /// Restart the downstream service after a successful sync.
    pub restart: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            restart: true,
        }
    }
}

/// Result of syncing one service.
#[derive(Debug, Clone)]
pub struct ServiceSync {
    pub service: ServiceName,
    pub report: SyncReport,
    /// The service that was restarted, if any.
    pub restarted: Option<ServiceName>,
}

/// Maps operator commands onto the sync engine and the container tooling.
pub struct Dispatcher<L, C> {
    config: ProjectConfig,
    lifecycle: L,
    containers: C,
}

impl Dispatcher<ComposeLifecycle, ComposeContainers> {
    /// Dispatcher driving the real compose tooling.
    pub fn compose(config: ProjectConfig) -> Self {
        let lifecycle = ComposeLifecycle::new(&config);
        let containers = ComposeContainers::new(&config);
        Self::new(config, lifecycle, containers)
    }
}

impl<L: LifecycleManager, C: ContainerRuntime> Dispatcher<L, C> {
    pub fn new(config: ProjectConfig, lifecycle: L, containers: C) -> Self {
        Self {
            config,
            lifecycle,
            containers,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &L {
        &self.lifecycle
    }

    pub fn containers(&self) -> &C {
        &self.containers
    }

    // -----------------------------------------------------------------------
    // sync
    // -----------------------------------------------------------------------

    /// Sync one service (by name, or the default) and restart its downstream
    /// service on success.
    pub fn sync(
        &self,
        service: Option<&str>,
        options: SyncOptions,
    ) -> Result<ServiceSync, DispatchError> {
        let service = self.config.service(service)?;
        let mut outcome = self.sync_service(service, options.dry_run)?;

        if options.restart && !options.dry_run {
            let target = service.restart_target();
            self.lifecycle
                .restart_service(target, self.config.restart_timeout())
                .map_err(|source| DispatchError::DownstreamDelegationFailure {
                    action: format!("restart of {target}"),
                    source,
                })?;
            outcome.restarted = Some(target.clone());
        }
        Ok(outcome)
    }

    /// Run the engine for `service` without any lifecycle call.
    ///
    /// Fails with `SourceUnavailable` or `PartialFailure` exactly when the
    /// run must not be followed by a restart.
    pub fn sync_service(
        &self,
        service: &ServiceConfig,
        dry_run: bool,
    ) -> Result<ServiceSync, DispatchError> {
        let request = SyncRequest::for_service(&self.config, service)?.dry_run(dry_run);
        let state_dir = self.config.state_path();

        let _lock = if dry_run {
            None
        } else {
            Some(RunLock::acquire(&state_dir, &request.build_root)?)
        };

        tracing::info!(
            service = %service.name,
            source = %request.source_root.display(),
            build = %request.build_root.display(),
            dry_run,
            "syncing",
        );

        let report = match sync_tree(&request) {
            Ok(report) => report,
            Err(SyncError::SourceUnavailable { path, source }) => {
                if !dry_run {
                    self.record(&service.name, &SyncRecord::source_unavailable());
                }
                return Err(DispatchError::SourceUnavailable {
                    service: service.name.clone(),
                    path,
                    source,
                });
            }
            Err(err) => return Err(err.into()),
        };

        if !dry_run {
            self.record(&service.name, &SyncRecord::from_report(&report));
        }

        if !report.is_success() {
            return Err(DispatchError::PartialFailure {
                service: service.name.clone(),
                failures: report.failures,
            });
        }

        Ok(ServiceSync {
            service: service.name.clone(),
            report,
            restarted: None,
        })
    }

    /// Sync every configured service in order, stopping at the first failure.
    ///
    /// `on_synced` sees each service as soon as it is done.
    pub fn sync_all(
        &self,
        on_synced: &mut dyn FnMut(&ServiceSync),
    ) -> Result<Vec<ServiceSync>, DispatchError> {
        let mut synced = Vec::with_capacity(self.config.services.len());
        for service in &self.config.services {
            let outcome = self.sync_service(service, false)?;
            on_synced(&outcome);
            synced.push(outcome);
        }
        Ok(synced)
    }

    fn record(&self, service: &ServiceName, record: &SyncRecord) {
        if let Err(err) = state::save_at(&self.config.state_path(), service.as_str(), record) {
            tracing::warn!(service = %service, error = %err, "failed to save sync record");
        }
    }

    // -----------------------------------------------------------------------
    // lifecycle
    // -----------------------------------------------------------------------

    /// Sync everything, then bring the topology up.
    pub fn up(
        &self,
        detach: bool,
        on_synced: &mut dyn FnMut(&ServiceSync),
    ) -> Result<Vec<ServiceSync>, DispatchError> {
        let synced = self.sync_all(on_synced)?;
        self.lifecycle.up(detach).map_err(delegation("up"))?;
        Ok(synced)
    }

    /// Sync everything, then tear down and bring the topology back up.
    pub fn restart(
        &self,
        detach: bool,
        on_synced: &mut dyn FnMut(&ServiceSync),
    ) -> Result<Vec<ServiceSync>, DispatchError> {
        let synced = self.sync_all(on_synced)?;
        self.lifecycle.down().map_err(delegation("down"))?;
        self.lifecycle.up(detach).map_err(delegation("up"))?;
        Ok(synced)
    }

    pub fn down(&self) -> Result<(), DispatchError> {
        self.lifecycle.down().map_err(delegation("down"))
    }

    pub fn rebuild(&self, detach: bool) -> Result<(), DispatchError> {
        self.lifecycle.rebuild(detach).map_err(delegation("rebuild"))
    }

    // -----------------------------------------------------------------------
    // pass-through
    // -----------------------------------------------------------------------

    pub fn logs(
        &self,
        service: Option<&str>,
        follow: bool,
        tail: Option<usize>,
    ) -> Result<(), DispatchError> {
        let service = service.map(ServiceName::from);
        self.containers
            .logs(service.as_ref(), follow, tail)
            .map_err(delegation("logs"))
    }

    pub fn status(&self) -> Result<(), DispatchError> {
        self.containers.status().map_err(delegation("status"))
    }

    /// Open `shell` (default: the configured runtime shell) in `service`.
    pub fn shell(&self, service: &str, shell: Option<&str>) -> Result<(), DispatchError> {
        let shell = shell.unwrap_or(self.config.runtime.shell.as_str());
        self.containers
            .shell(&ServiceName::from(service), shell)
            .map_err(delegation("shell"))
    }
}

fn delegation(action: &'static str) -> impl Fn(crate::RuntimeError) -> DispatchError {
    move |source| DispatchError::DownstreamDelegationFailure {
        action: action.to_string(),
        source,
    }
}
