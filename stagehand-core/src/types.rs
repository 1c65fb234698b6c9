//! Domain types for a Stagehand project.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a compose service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl ServiceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Exclusions applied when a service does not list its own.
///
/// Cache directories, compiled artifacts, editor swap files and OS metadata.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "__pycache__",
    "*.pyc",
    "*.pyo",
    ".pytest_cache",
    ".mypy_cache",
    ".venv",
    "node_modules",
    ".git",
    ".DS_Store",
    "*.swp",
];

pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
pub const DEFAULT_RUNTIME_PROGRAM: &str = "docker";
pub const DEFAULT_STATE_DIR: &str = ".stagehand";
pub const DEFAULT_RESTART_TIMEOUT_SECS: u64 = 60;

fn default_compose_file() -> PathBuf {
    PathBuf::from(DEFAULT_COMPOSE_FILE)
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_restart_timeout_secs() -> u64 {
    DEFAULT_RESTART_TIMEOUT_SECS
}

fn default_program() -> String {
    DEFAULT_RUNTIME_PROGRAM.to_string()
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// How the container runtime is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Container runtime executable (`docker`, `podman`).
    #[serde(default = "default_program")]
    pub program: String,
    /// Shell used by `stagehand shell` when none is given.
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            shell: default_shell(),
        }
    }
}

/// One synchronized service: a source tree mirrored into a build tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: ServiceName,
    /// Editable source root. Relative paths resolve against the project root.
    pub source: PathBuf,
    /// Build root read by the running service.
    pub build: PathBuf,
    /// Compose service to restart after a successful sync (defaults to `name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<ServiceName>,
    /// Glob patterns omitted from the mirror. `None` means [`DEFAULT_EXCLUDES`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

impl ServiceConfig {
    /// The downstream service restarted after a successful sync.
    pub fn restart_target(&self) -> &ServiceName {
        self.restart.as_ref().unwrap_or(&self.name)
    }

    /// Effective exclusion patterns.
    pub fn exclusions(&self) -> Vec<String> {
        match &self.exclude {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Root of `stagehand.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Compose project name (`-p`).
    pub project: String,
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default = "default_restart_timeout_secs")]
    pub restart_timeout_secs: u64,
    /// Lock files and sync records live here.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_service: Option<ServiceName>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    /// Directory holding the config file; filled in on load.
    #[serde(skip)]
    pub root: PathBuf,
}

impl ProjectConfig {
    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }

    pub fn service_names(&self) -> Vec<ServiceName> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    /// Resolve `path` against the project root unless it is already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
