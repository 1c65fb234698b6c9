//! Read-only preview of a sync as unified diffs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

use crate::{
    error::io_err,
    mirror::{ChangeReason, SyncPlan},
    scan::EntryKind,
    SyncError,
};

/// What a sync would do to one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffChange {
    Added,
    Modified,
    Deleted,
    /// Same content, different permission bits.
    Mode,
    /// Directory or symlink change; no textual body.
    Entry,
}

/// A single pending change with its rendered diff (empty for non-text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub change: DiffChange,
    pub unified_diff: String,
}

/// Render every change in `plan` against the current build tree.
///
/// Nothing is written. Deletions come first, in the order they would run.
pub fn diff_plan(plan: &SyncPlan) -> Result<Vec<FileDiff>, SyncError> {
    let mut diffs = Vec::new();

    for deletion in &plan.deletions {
        let unified_diff = match deletion.kind {
            EntryKind::File => {
                let existing = read_text(&plan.build_root.join(&deletion.path))?;
                render(&deletion.path, existing.as_deref(), Some(""), DiffChange::Deleted)
            }
            _ => String::new(),
        };
        diffs.push(FileDiff {
            path: deletion.path.clone(),
            change: DiffChange::Deleted,
            unified_diff,
        });
    }

    for copy in &plan.copies {
        if copy.kind != EntryKind::File {
            diffs.push(FileDiff {
                path: copy.path.clone(),
                change: DiffChange::Entry,
                unified_diff: String::new(),
            });
            continue;
        }
        let (change, old) = match copy.reason {
            ChangeReason::Permissions => {
                diffs.push(FileDiff {
                    path: copy.path.clone(),
                    change: DiffChange::Mode,
                    unified_diff: String::new(),
                });
                continue;
            }
            ChangeReason::Missing | ChangeReason::KindChanged => {
                (DiffChange::Added, Some(String::new()))
            }
            _ => (
                DiffChange::Modified,
                read_text(&plan.build_root.join(&copy.path))?,
            ),
        };
        let new = read_text(&plan.source_root.join(&copy.path))?;
        diffs.push(FileDiff {
            path: copy.path.clone(),
            change,
            unified_diff: render(&copy.path, old.as_deref(), new.as_deref(), change),
        });
    }

    Ok(diffs)
}

/// `None` for binary (non UTF-8) content; empty for a missing file.
fn read_text(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8(bytes)
            .ok()
            .map(|text| text.replace("\r\n", "\n"))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Some(String::new())),
        Err(err) => Err(io_err(path, err)),
    }
}

fn render(relative: &Path, old: Option<&str>, new: Option<&str>, change: DiffChange) -> String {
    let old_header = match change {
        DiffChange::Added => "/dev/null".to_string(),
        _ => format!("a/{}", relative.display()),
    };
    let new_header = match change {
        DiffChange::Deleted => "/dev/null".to_string(),
        _ => format!("b/{}", relative.display()),
    };
    let (Some(old), Some(new)) = (old, new) else {
        return format!("Binary files {old_header} and {new_header} differ\n");
    };
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}
