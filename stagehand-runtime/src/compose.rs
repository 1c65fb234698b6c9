//! `<program> compose -p <project> -f <file> …` invocations.

use std::path::PathBuf;

use stagehand_core::ProjectConfig;

use crate::process::ProcessSpec;

/// Base compose command line for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    pub program: String,
    pub project: String,
    pub compose_file: PathBuf,
    /// Working directory for every invocation (the project root).
    pub cwd: PathBuf,
}

impl ComposeCommand {
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            program: config.runtime.program.clone(),
            project: config.project.clone(),
            compose_file: config.resolve(&config.compose_file),
            cwd: config.root.clone(),
        }
    }

    /// `compose -p <project> -f <file>` followed by `args`.
    pub fn spec<I, S>(&self, args: I) -> ProcessSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProcessSpec::new(&self.program)
            .args([
                "compose".to_string(),
                "-p".to_string(),
                self.project.clone(),
                "-f".to_string(),
                self.compose_file.display().to_string(),
            ])
            .args(args)
            .cwd(&self.cwd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_prefixes_project_and_file() {
        let compose = ComposeCommand {
            program: "podman".into(),
            project: "shop".into(),
            compose_file: PathBuf::from("/work/shop/compose.yml"),
            cwd: PathBuf::from("/work/shop"),
        };
        let spec = compose.spec(["ps"]);
        assert_eq!(
            spec.command_line(),
            "podman compose -p shop -f /work/shop/compose.yml ps"
        );
        assert_eq!(spec.cwd.as_deref(), Some(std::path::Path::new("/work/shop")));
    }
}
