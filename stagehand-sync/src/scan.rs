//! Tree enumeration.
//!
//! Walks a root without following symlinks, prunes excluded directories
//! before descending, and records unreadable subtrees instead of failing
//! the whole scan.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::exclude::ExclusionSet;

/// Kind of a tree entry. A kind change at the same path is a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Dir => write!(f, "directory"),
            EntryKind::Symlink => write!(f, "symlink"),
        }
    }
}

/// Metadata the mirror compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub len: u64,
    /// Permission bits (`0o777` mask); zero where the platform has none.
    pub mode: u32,
    pub link_target: Option<PathBuf>,
}

/// A subtree that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unreadable {
    pub path: PathBuf,
    pub error: String,
}

/// Filtered snapshot of one root, keyed by relative path.
///
/// `BTreeMap` ordering puts every directory before its descendants.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub root: PathBuf,
    pub entries: BTreeMap<PathBuf, Entry>,
    pub unreadable: Vec<Unreadable>,
    /// Directories with excluded content somewhere below them.
    pub holds_excluded: BTreeSet<PathBuf>,
}

impl Tree {
    /// A tree with no entries, for a build root that does not exist yet.
    pub fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn get(&self, relative: &Path) -> Option<&Entry> {
        self.entries.get(relative)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the directory at `relative` still has excluded content inside.
    pub fn holds_excluded(&self, relative: &Path) -> bool {
        self.holds_excluded.contains(relative)
    }

    /// Whether `relative` lies at or below a subtree that failed to scan.
    pub fn is_shadowed(&self, relative: &Path) -> bool {
        self.unreadable.iter().any(|u| relative.starts_with(&u.path))
    }
}

/// Enumerate `root`, skipping every entry `exclusions` matches.
///
/// The root itself must be a readable directory; otherwise the I/O error is
/// returned and the caller decides how fatal that is.
pub fn scan_tree(root: &Path, exclusions: &ExclusionSet) -> io::Result<Tree> {
    let meta = std::fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(io::Error::other(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    // Surface an unreadable root here rather than as a per-entry failure.
    std::fs::read_dir(root)?;

    let mut tree = Tree::empty(root);
    let mut excluded = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .follow_root_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(root) {
            Ok(relative) if exclusions.matches(relative) => {
                excluded.push(relative.to_path_buf());
                false
            }
            _ => true,
        });

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                tracing::warn!(path = %path.display(), error = %err, "unreadable entry");
                tree.unreadable.push(Unreadable {
                    path,
                    error: err.to_string(),
                });
                continue;
            }
        };

        let relative = match entry.path().strip_prefix(root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => continue,
        };

        match describe(entry.path(), entry.file_type()) {
            Ok(described) => {
                tree.entries.insert(relative, described);
            }
            Err(err) => {
                tracing::warn!(path = %relative.display(), error = %err, "cannot stat entry");
                tree.unreadable.push(Unreadable {
                    path: relative,
                    error: err.to_string(),
                });
            }
        }
    }

    for path in &excluded {
        for ancestor in path.ancestors().skip(1) {
            // Ancestors of a recorded directory are already recorded.
            if ancestor.as_os_str().is_empty()
                || !tree.holds_excluded.insert(ancestor.to_path_buf())
            {
                break;
            }
        }
    }

    tracing::debug!(
        root = %root.display(),
        entries = tree.entries.len(),
        unreadable = tree.unreadable.len(),
        "scanned tree",
    );
    Ok(tree)
}

fn describe(path: &Path, file_type: std::fs::FileType) -> io::Result<Entry> {
    if file_type.is_symlink() {
        return Ok(Entry {
            kind: EntryKind::Symlink,
            len: 0,
            mode: 0,
            link_target: Some(std::fs::read_link(path)?),
        });
    }

    let meta = std::fs::symlink_metadata(path)?;
    let kind = if file_type.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    Ok(Entry {
        kind,
        len: if kind == EntryKind::File { meta.len() } else { 0 },
        mode: permission_bits(&meta),
        link_target: None,
    })
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_lists_files_and_directories_relative_to_root() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt", "a");
        touch(dir.path(), "b/c.txt", "cc");

        let tree = scan_tree(dir.path(), &ExclusionSet::empty()).expect("scan");
        let paths: Vec<_> = tree.entries.keys().cloned().collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b"),
                PathBuf::from("b/c.txt")
            ]
        );
        assert_eq!(tree.get(Path::new("b")).unwrap().kind, EntryKind::Dir);
        assert_eq!(tree.get(Path::new("b/c.txt")).unwrap().len, 2);
    }

    #[test]
    fn excluded_directories_are_pruned() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "keep.py", "x");
        touch(dir.path(), "cache/x.bin", "x");
        touch(dir.path(), "pkg/__pycache__/m.pyc", "x");

        let rules = ExclusionSet::new(["cache", "__pycache__"]).unwrap();
        let tree = scan_tree(dir.path(), &rules).expect("scan");
        assert!(tree.get(Path::new("keep.py")).is_some());
        assert!(tree.get(Path::new("pkg")).is_some());
        assert!(tree.entries.keys().all(|p| !p.starts_with("cache")));
        assert!(tree.get(Path::new("pkg/__pycache__")).is_none());
    }

    #[test]
    fn directories_above_excluded_content_are_marked() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app/pkg/__pycache__/m.pyc", "x");
        touch(dir.path(), "app/other/m.py", "x");
        touch(dir.path(), "cache/x.bin", "x");

        let rules = ExclusionSet::new(["cache", "__pycache__"]).unwrap();
        let tree = scan_tree(dir.path(), &rules).expect("scan");
        assert!(tree.holds_excluded(Path::new("app/pkg")));
        assert!(tree.holds_excluded(Path::new("app")));
        assert!(!tree.holds_excluded(Path::new("app/other")));
        assert!(!tree.holds_excluded(Path::new("")));
    }

    #[test]
    #[cfg(unix)]
    fn symlinked_root_is_followed() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "real/inner.txt", "x");
        let alias = dir.path().join("alias");
        std::os::unix::fs::symlink(dir.path().join("real"), &alias).unwrap();

        let tree = scan_tree(&alias, &ExclusionSet::empty()).expect("scan");
        assert!(tree.get(Path::new("inner.txt")).is_some());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = scan_tree(&dir.path().join("nope"), &ExclusionSet::empty()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn file_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "file.txt", "x");
        assert!(scan_tree(&dir.path().join("file.txt"), &ExclusionSet::empty()).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn symlinks_are_recorded_not_followed() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "real/inner.txt", "x");
        std::os::unix::fs::symlink("real", dir.path().join("alias")).unwrap();

        let tree = scan_tree(dir.path(), &ExclusionSet::empty()).expect("scan");
        let alias = tree.get(Path::new("alias")).expect("alias");
        assert_eq!(alias.kind, EntryKind::Symlink);
        assert_eq!(alias.link_target.as_deref(), Some(Path::new("real")));
        assert!(tree.get(Path::new("alias/inner.txt")).is_none());
    }

    #[test]
    fn shadowed_paths_follow_unreadable_prefixes() {
        let mut tree = Tree::empty(Path::new("/src"));
        tree.unreadable.push(Unreadable {
            path: PathBuf::from("locked"),
            error: "denied".into(),
        });
        assert!(tree.is_shadowed(Path::new("locked/file.txt")));
        assert!(!tree.is_shadowed(Path::new("open/file.txt")));
    }
}
