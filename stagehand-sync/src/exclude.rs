//! Exclusion rules.
//!
//! A pattern without a `/` is tested against every single segment of a
//! relative path, so `__pycache__` excludes that directory at any depth and
//! `*.pyc` excludes compiled files anywhere. A pattern containing a `/` (or
//! anchored with a leading `/`) is tested against every leading sub-path:
//! `app/generated` excludes `app/generated` and everything beneath it.
//!
//! Matching is pure; nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::SyncError;

/// Compiled, ordered set of exclusion patterns.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    patterns: Vec<String>,
    segment: GlobSet,
    prefix: GlobSet,
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl ExclusionSet {
    /// Compile `patterns`. Blank entries are ignored.
    pub fn new<I, S>(patterns: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept = Vec::new();
        let mut segment = GlobSetBuilder::new();
        let mut prefix = GlobSetBuilder::new();

        for raw in patterns {
            let raw = raw.as_ref().trim();
            let normalized = normalize(raw);
            if normalized.is_empty() {
                continue;
            }
            let anchored = raw.starts_with('/') || normalized.contains('/');
            let glob = compile(raw, &normalized)?;
            if anchored {
                prefix.add(glob);
            } else {
                segment.add(glob);
            }
            kept.push(raw.to_string());
        }

        let joined = kept.join(", ");
        Ok(Self {
            segment: segment.build().map_err(|source| SyncError::Pattern {
                pattern: joined.clone(),
                source,
            })?,
            prefix: prefix.build().map_err(|source| SyncError::Pattern {
                pattern: joined,
                source,
            })?,
            patterns: kept,
        })
    }

    /// A set that excludes nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            segment: GlobSet::empty(),
            prefix: GlobSet::empty(),
        }
    }

    /// Patterns in the order they were given.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `relative` (a path relative to a tree root) is excluded.
    ///
    /// A path is excluded when any of its segments or leading sub-paths
    /// matches, so everything below an excluded directory is excluded too.
    pub fn matches(&self, relative: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let mut leading = PathBuf::new();
        for component in relative.components() {
            let Component::Normal(segment) = component else {
                continue;
            };
            leading.push(segment);
            if self.segment.is_match(Path::new(segment)) || self.prefix.is_match(&leading) {
                return true;
            }
        }
        false
    }
}

/// One-shot form of [`ExclusionSet::matches`] for callers holding raw patterns.
pub fn matches(relative: &Path, patterns: &[String]) -> Result<bool, SyncError> {
    Ok(ExclusionSet::new(patterns)?.matches(relative))
}

fn normalize(raw: &str) -> String {
    let trimmed = raw.trim_start_matches("./").trim_start_matches('/');
    trimmed.trim_end_matches('/').to_string()
}

fn compile(raw: &str, normalized: &str) -> Result<Glob, SyncError> {
    GlobBuilder::new(normalized)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|source| SyncError::Pattern {
            pattern: raw.to_string(),
            source,
        })
}
