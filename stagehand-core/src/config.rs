//! Project configuration (`stagehand.yaml`).
//!
//! # Discovery
//!
//! ```text
//! <project>/
//!   stagehand.yaml          (this file)
//!   .stagehand/             (state_dir — locks and sync records)
//!   services/api/src/       (a service `source`)
//!   build/api/              (the matching `build`)
//! ```
//!
//! # API pattern
//!
//! Functions that touch the filesystem come in two forms:
//! - `fn_at(start: &Path, …)` — explicit directory; used in tests with `TempDir`
//! - `fn(…)` — derives the directory from the process working directory
//!
//! Tests must NEVER call the cwd wrappers; always use `_at`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::{ProjectConfig, ServiceConfig, ServiceName};

/// File name searched for during discovery.
pub const CONFIG_FILE: &str = "stagehand.yaml";

// ---------------------------------------------------------------------------
// 1. Discovery
// ---------------------------------------------------------------------------

/// Walk from `start` up to the filesystem root looking for [`CONFIG_FILE`].
pub fn find_at(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut cursor = Some(start);
    while let Some(dir) = cursor {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Ok(candidate);
        }
        cursor = dir.parent();
    }
    Err(ConfigError::NotFound {
        start: start.to_path_buf(),
    })
}

/// `find_at` convenience wrapper rooted at the working directory.
pub fn find() -> Result<PathBuf, ConfigError> {
    find_at(&cwd()?)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate the config file at `path`.
///
/// Returns `ConfigError::Parse` (with path + line context) if malformed YAML
/// and `ConfigError::Invalid` if the services are unusable.
pub fn load_at(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut config: ProjectConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

    let root = path.parent().unwrap_or_else(|| Path::new("."));
    config.root = std::fs::canonicalize(root).map_err(|e| io_err(root, e))?;
    validate(&config)?;
    Ok(config)
}

/// Load `explicit` if given, otherwise discover the config from `start`.
pub fn locate_and_load_at(
    start: &Path,
    explicit: Option<&Path>,
) -> Result<ProjectConfig, ConfigError> {
    match explicit {
        Some(path) => load_at(path),
        None => load_at(&find_at(start)?),
    }
}

/// `locate_and_load_at` convenience wrapper rooted at the working directory.
pub fn locate_and_load(explicit: Option<&Path>) -> Result<ProjectConfig, ConfigError> {
    locate_and_load_at(&cwd()?, explicit)
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

/// Reject configs the sync engine cannot run safely.
///
/// A build root nested inside its source root would mirror itself on every
/// run, and the reverse would delete the source as a stale entry.
pub fn validate(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.trim().is_empty() {
        return Err(ConfigError::Invalid("`project` must not be empty".into()));
    }

    let mut seen = BTreeSet::new();
    for service in &config.services {
        if service.name.0.trim().is_empty() {
            return Err(ConfigError::Invalid("service name must not be empty".into()));
        }
        // Names become file names under the state directory.
        if service.name.0.contains(['/', '\\']) || service.name.0.starts_with('.') {
            return Err(ConfigError::Invalid(format!(
                "service name '{}' must not contain path separators or start with '.'",
                service.name
            )));
        }
        if !seen.insert(service.name.0.clone()) {
            return Err(ConfigError::Invalid(format!(
                "service '{}' is defined more than once",
                service.name
            )));
        }

        let source = config.resolve(&service.source);
        let build = config.resolve(&service.build);
        if source == build {
            return Err(ConfigError::Invalid(format!(
                "service '{}': source and build are the same directory",
                service.name
            )));
        }
        if build.starts_with(&source) || source.starts_with(&build) {
            return Err(ConfigError::Invalid(format!(
                "service '{}': source and build must not be nested",
                service.name
            )));
        }
    }

    if let Some(default) = &config.default_service {
        if !seen.contains(&default.0) {
            return Err(ConfigError::Invalid(format!(
                "default_service '{default}' is not a configured service"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Service lookup
// ---------------------------------------------------------------------------

impl ProjectConfig {
    /// Pick a service by name, falling back to `default_service` and then to
    /// the only configured service.
    pub fn service(&self, name: Option<&str>) -> Result<&ServiceConfig, ConfigError> {
        let wanted = match name {
            Some(name) => Some(ServiceName::from(name)),
            None => self.default_service.clone(),
        };

        match wanted {
            Some(wanted) => self
                .services
                .iter()
                .find(|s| s.name == wanted)
                .ok_or_else(|| ConfigError::UnknownService {
                    name: wanted.0.clone(),
                    available: self.available_names(),
                }),
            None => match self.services.as_slice() {
                [only] => Ok(only),
                [] => Err(ConfigError::Invalid("no services configured".into())),
                _ => Err(ConfigError::Invalid(format!(
                    "several services configured ({}); name one or set default_service",
                    self.available_names()
                ))),
            },
        }
    }

    /// `stagehand.yaml` path this config was loaded from.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Absolute state directory.
    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.state_dir)
    }

    fn available_names(&self) -> String {
        let names: Vec<&str> = self.services.iter().map(|s| s.name.as_str()).collect();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
}

// ---------------------------------------------------------------------------
// 5. Scaffold
// ---------------------------------------------------------------------------

/// Write a starter `stagehand.yaml` into `dir`.
///
/// Idempotent: an existing file is left untouched and `Ok(false)` returned.
/// Write flow: render → `.yaml.tmp` sibling → `rename`.
pub fn scaffold_at(dir: &Path, project: &str, service: &str) -> Result<bool, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(false);
    }

    let content = format!(
        "project: {project}\n\
         compose_file: docker-compose.yml\n\
         default_service: {service}\n\
         services:\n  \
         - name: {service}\n    \
         source: services/{service}/src\n    \
         build: build/{service}\n"
    );

    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let tmp = dir.join(format!("{CONFIG_FILE}.tmp"));
    std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn cwd() -> Result<PathBuf, ConfigError> {
    std::env::current_dir().map_err(|e| io_err(".", e))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, yaml).expect("write config");
        path
    }

    const TWO_SERVICES: &str = r#"project: demo
services:
  - name: api
    source: api/src
    build: build/api
  - name: worker
    source: worker/src
    build: build/worker
    restart: worker-runner
"#;

    #[test]
    fn find_walks_up_to_ancestor() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "project: demo\n");
        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = find_at(&nested).expect("find");
        assert_eq!(found, tmp.path().join(CONFIG_FILE));
    }

    #[test]
    fn find_reports_start_when_missing() {
        let tmp = TempDir::new().unwrap();
        let err = find_at(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().contains("stagehand.yaml"));
    }

    #[test]
    fn load_sets_canonical_root() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(tmp.path(), TWO_SERVICES);
        let config = load_at(&path).expect("load");
        assert_eq!(config.root, fs::canonicalize(tmp.path()).unwrap());
        assert_eq!(config.config_path(), config.root.join(CONFIG_FILE));
        assert_eq!(config.state_path(), config.root.join(".stagehand"));
    }

    #[test]
    fn service_lookup_by_name_and_default() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(tmp.path(), TWO_SERVICES);
        let mut config = load_at(&path).expect("load");

        assert_eq!(config.service(Some("worker")).unwrap().name.as_str(), "worker");

        let err = config.service(None).unwrap_err();
        assert!(err.to_string().contains("several services"), "got: {err}");

        config.default_service = Some(ServiceName::from("api"));
        assert_eq!(config.service(None).unwrap().name.as_str(), "api");
    }

    #[test]
    fn unknown_service_lists_available() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(tmp.path(), TWO_SERVICES);
        let config = load_at(&path).expect("load");
        let err = config.service(Some("db")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownService { .. }));
        assert!(err.to_string().contains("api, worker"));
    }

    #[test]
    fn nested_roots_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            tmp.path(),
            "project: demo\nservices:\n  - name: api\n    source: src\n    build: src/build\n",
        );
        let err = load_at(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    }

    #[test]
    fn duplicate_service_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            tmp.path(),
            "project: demo\nservices:\n  - name: api\n    source: a\n    build: b\n  - name: api\n    source: c\n    build: d\n",
        );
        let err = load_at(&path).unwrap_err();
        assert!(err.to_string().contains("more than once"), "got: {err}");
    }

    #[rstest::rstest]
    #[case("../escape")]
    #[case("a/b")]
    #[case("a\\b")]
    #[case("..")]
    #[case(".hidden")]
    fn path_like_service_names_are_rejected(#[case] name: &str) {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            tmp.path(),
            &format!("project: demo\nservices:\n  - name: '{name}'\n    source: a\n    build: b\n"),
        );
        let err = load_at(&path).unwrap_err();
        assert!(err.to_string().contains("path separators"), "got: {err}");
    }

    #[test]
    fn unknown_default_service_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            tmp.path(),
            "project: demo\ndefault_service: nope\nservices:\n  - name: api\n    source: a\n    build: b\n",
        );
        assert!(matches!(load_at(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn scaffold_is_idempotent_and_loadable() {
        let tmp = TempDir::new().unwrap();
        assert!(scaffold_at(tmp.path(), "demo", "api").expect("scaffold"));
        assert!(!scaffold_at(tmp.path(), "other", "web").expect("rescaffold"));
        assert!(!tmp.path().join("stagehand.yaml.tmp").exists());

        let config = load_at(&tmp.path().join(CONFIG_FILE)).expect("load");
        assert_eq!(config.project, "demo");
        assert_eq!(config.service(None).unwrap().name.as_str(), "api");
    }
}
