//! Error types for stagehand-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a sync before or while it starts.
///
/// Per-entry copy/delete failures are not errors at this level: they are
/// collected in [`crate::SyncReport::failures`] and the run continues.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source root is missing, not a directory, or unreadable.
    #[error("source tree unavailable at {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The build root could not be created or is not a directory.
    #[error("build tree unavailable at {path}: {source}")]
    BuildRootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An exclusion pattern failed to compile.
    #[error("invalid exclusion pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Another sync holds the run lock for the same build root.
    #[error("another sync is running against this build tree (lock: {path}; holder: {holder})")]
    Locked { path: PathBuf, holder: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (sync records).
    #[error("sync record JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
