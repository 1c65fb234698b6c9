use std::path::PathBuf;
use std::time::Duration;

use stagehand_core::ServiceName;
use stagehand_sync::FailedEntry;
use thiserror::Error;

/// Failures invoking an external program.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` did not finish within {}s and was killed", after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("`{command}` exited with {}{}", describe_code(*code), describe_stderr(stderr))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Error surface of a dispatched command.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Nothing was mutated and nothing restarted.
    #[error("{service}: source tree unavailable at {path}: {source}")]
    SourceUnavailable {
        service: ServiceName,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some entries were applied, some failed; no restart was triggered.
    #[error("{service}: sync failed for {} path(s): {}", failures.len(), list_paths(failures))]
    PartialFailure {
        service: ServiceName,
        failures: Vec<FailedEntry>,
    },

    /// The build tree is synced but the lifecycle call after it failed.
    #[error("{action} failed: {source}")]
    DownstreamDelegationFailure {
        action: String,
        #[source]
        source: RuntimeError,
    },

    #[error("configuration error: {0}")]
    Config(#[from] stagehand_core::ConfigError),

    #[error(transparent)]
    Sync(#[from] stagehand_sync::SyncError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("watch task failed: {0}")]
    Watch(String),
}

fn list_paths(failures: &[FailedEntry]) -> String {
    let mut paths: Vec<String> = failures
        .iter()
        .map(|f| f.path.display().to_string())
        .collect();
    paths.dedup();
    paths.join(", ")
}

impl DispatchError {
    /// Whether the failure happened before any lifecycle call.
    pub fn is_sync_failure(&self) -> bool {
        matches!(
            self,
            DispatchError::SourceUnavailable { .. }
                | DispatchError::PartialFailure { .. }
                | DispatchError::Sync(_)
        )
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DispatchError {
    DispatchError::Io {
        path: path.into(),
        source,
    }
}
