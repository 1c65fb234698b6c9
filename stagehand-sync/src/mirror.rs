//! Mirror a source tree into a build tree.
//!
//! ## `sync_tree` protocol
//!
//! 1. Scan the source root (exclusions pruned). Missing/unreadable root →
//!    [`SyncError::SourceUnavailable`]; nothing is touched.
//! 2. Create the build root if absent, then scan it with the same exclusions.
//!    Excluded build entries are invisible and therefore never modified.
//! 3. Plan: every build entry with no source counterpart, or of a different
//!    kind, is deleted; every source entry missing from the build tree or
//!    differing in content, permissions or link target is copied. A stale
//!    directory that still holds excluded content is kept, unless the source
//!    now has an entry of another kind at that path.
//! 4. Apply deletions deepest-first, then copies parents-first. A replaced
//!    directory is removed with everything below it.
//! 5. Collect every per-entry failure and keep going.

use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use stagehand_core::{ProjectConfig, ServiceConfig};

use crate::exclude::ExclusionSet;
use crate::ops::{FileOps, LocalFs};
use crate::scan::{scan_tree, Entry, EntryKind, Tree};
use crate::SyncError;

// ---------------------------------------------------------------------------
// Request / plan / report
// ---------------------------------------------------------------------------

/// Inputs of one sync run.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub source_root: PathBuf,
    pub build_root: PathBuf,
    pub exclusions: ExclusionSet,
    /// Plan only: report what would change without touching the build tree.
    pub dry_run: bool,
}

impl SyncRequest {
    pub fn new(
        source_root: impl Into<PathBuf>,
        build_root: impl Into<PathBuf>,
        exclusions: ExclusionSet,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            build_root: build_root.into(),
            exclusions,
            dry_run: false,
        }
    }

    /// Roots and exclusions of `service`, resolved against the project root.
    pub fn for_service(
        project: &ProjectConfig,
        service: &ServiceConfig,
    ) -> Result<Self, SyncError> {
        Ok(Self::new(
            project.resolve(&service.source),
            project.resolve(&service.build),
            ExclusionSet::new(service.exclusions())?,
        ))
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Why a source entry is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Absent from the build tree.
    Missing,
    /// Present with another kind; the old entry is deleted first.
    KindChanged,
    Content,
    Permissions,
    LinkTarget,
}

/// A pending copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub reason: ChangeReason,
    pub link_target: Option<PathBuf>,
}

/// A pending deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelete {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// The source has an entry of another kind here.
    pub replaced: bool,
}

/// Filesystem step that failed for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Scan,
    Compare,
    Copy,
    CreateDir,
    Symlink,
    Delete,
}

impl std::fmt::Display for FileOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FileOp::Scan => "scan",
            FileOp::Compare => "compare",
            FileOp::Copy => "copy",
            FileOp::CreateDir => "mkdir",
            FileOp::Symlink => "symlink",
            FileOp::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// One entry that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub path: PathBuf,
    pub op: FileOp,
    pub error: String,
}

impl FailedEntry {
    fn new(path: &Path, op: FileOp, error: impl ToString) -> Self {
        Self {
            path: path.to_path_buf(),
            op,
            error: error.to_string(),
        }
    }
}

/// Everything a sync would do, computed without writing.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub source_root: PathBuf,
    pub build_root: PathBuf,
    /// Deepest-first.
    pub deletions: Vec<PlannedDelete>,
    /// Parents-first.
    pub copies: Vec<PlannedCopy>,
    /// Source subtrees that could not be read, and comparisons that failed.
    pub failures: Vec<FailedEntry>,
    /// Non-excluded entries found in the source tree.
    pub source_entries: usize,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.deletions.is_empty() && self.copies.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.deletions.len() + self.copies.len()
    }
}

/// Outcome of a sync run, per entry.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub source_root: PathBuf,
    pub build_root: PathBuf,
    /// Files and symlinks written (or that would be, on a dry run).
    pub copied: Vec<PathBuf>,
    /// Files and symlinks removed.
    pub deleted: Vec<PathBuf>,
    pub dirs_created: Vec<PathBuf>,
    pub dirs_removed: Vec<PathBuf>,
    pub failures: Vec<FailedEntry>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

/// Summary view of a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success {
        files_copied: usize,
        files_deleted: usize,
    },
    /// Some entries failed; the rest were applied and are not rolled back.
    PartialFailure { failed: Vec<PathBuf> },
}

impl SyncReport {
    pub fn files_copied(&self) -> usize {
        self.copied.len()
    }

    pub fn files_deleted(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the run changed (or would change) anything.
    pub fn is_noop(&self) -> bool {
        self.copied.is_empty()
            && self.deleted.is_empty()
            && self.dirs_created.is_empty()
            && self.dirs_removed.is_empty()
    }

    /// Relative paths that failed, sorted and deduplicated.
    pub fn failed_paths(&self) -> Vec<PathBuf> {
        self.failures
            .iter()
            .map(|f| f.path.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn outcome(&self) -> SyncOutcome {
        if self.failures.is_empty() {
            SyncOutcome::Success {
                files_copied: self.files_copied(),
                files_deleted: self.files_deleted(),
            }
        } else {
            SyncOutcome::PartialFailure {
                failed: self.failed_paths(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Compute what a sync of `source_root` into `build_root` would do.
///
/// A missing build root plans as empty.
pub fn plan(
    source_root: &Path,
    build_root: &Path,
    exclusions: &ExclusionSet,
) -> Result<SyncPlan, SyncError> {
    let source = scan_source(source_root, exclusions)?;
    let build = scan_build(build_root, exclusions, false)?;
    Ok(diff_trees(&source, &build))
}

fn scan_source(root: &Path, exclusions: &ExclusionSet) -> Result<Tree, SyncError> {
    scan_tree(root, exclusions).map_err(|source| SyncError::SourceUnavailable {
        path: root.to_path_buf(),
        source,
    })
}

fn scan_build(root: &Path, exclusions: &ExclusionSet, create: bool) -> Result<Tree, SyncError> {
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(SyncError::BuildRootUnavailable {
                path: root.to_path_buf(),
                source: io::Error::other("not a directory"),
            })
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if !create {
                return Ok(Tree::empty(root));
            }
            std::fs::create_dir_all(root).map_err(|source| SyncError::BuildRootUnavailable {
                path: root.to_path_buf(),
                source,
            })?;
            tracing::info!(build = %root.display(), "created build root");
        }
        Err(source) => {
            return Err(SyncError::BuildRootUnavailable {
                path: root.to_path_buf(),
                source,
            })
        }
    }
    scan_tree(root, exclusions).map_err(|source| SyncError::BuildRootUnavailable {
        path: root.to_path_buf(),
        source,
    })
}

fn diff_trees(source: &Tree, build: &Tree) -> SyncPlan {
    let mut failures: Vec<FailedEntry> = source
        .unreadable
        .iter()
        .chain(build.unreadable.iter())
        .map(|u| FailedEntry::new(&u.path, FileOp::Scan, &u.error))
        .collect();

    // Reverse map order visits children before their parent directory.
    let mut deletions = Vec::new();
    for (path, entry) in build.entries.iter().rev() {
        if source.is_shadowed(path) {
            continue;
        }
        let replaced = match source.get(path) {
            None => false,
            Some(src) if src.kind != entry.kind => true,
            Some(_) => continue,
        };
        // Excluded content is left alone, and so is the directory holding it.
        if !replaced && entry.kind == EntryKind::Dir && build.holds_excluded(path) {
            continue;
        }
        deletions.push(PlannedDelete {
            path: path.clone(),
            kind: entry.kind,
            replaced,
        });
    }

    let mut copies = Vec::new();
    for (path, entry) in &source.entries {
        if build.is_shadowed(path) {
            continue;
        }
        let reason = match build.get(path) {
            None => Some(ChangeReason::Missing),
            Some(existing) if existing.kind != entry.kind => Some(ChangeReason::KindChanged),
            Some(existing) => {
                match compare(&source.root, &build.root, path, entry, existing) {
                    Ok(reason) => reason,
                    Err(err) => {
                        failures.push(FailedEntry::new(path, FileOp::Compare, err));
                        None
                    }
                }
            }
        };
        if let Some(reason) = reason {
            copies.push(PlannedCopy {
                path: path.clone(),
                kind: entry.kind,
                reason,
                link_target: entry.link_target.clone(),
            });
        }
    }

    SyncPlan {
        source_root: source.root.clone(),
        build_root: build.root.clone(),
        deletions,
        copies,
        failures,
        source_entries: source.len(),
    }
}

/// Compare two entries of the same kind.
fn compare(
    source_root: &Path,
    build_root: &Path,
    relative: &Path,
    src: &Entry,
    dst: &Entry,
) -> io::Result<Option<ChangeReason>> {
    match src.kind {
        EntryKind::Dir => Ok(None),
        EntryKind::Symlink => {
            Ok((src.link_target != dst.link_target).then_some(ChangeReason::LinkTarget))
        }
        EntryKind::File => {
            if src.len != dst.len {
                return Ok(Some(ChangeReason::Content));
            }
            let source_digest = file_digest(&source_root.join(relative))?;
            if source_digest != file_digest(&build_root.join(relative))? {
                return Ok(Some(ChangeReason::Content));
            }
            if src.mode != dst.mode {
                return Ok(Some(ChangeReason::Permissions));
            }
            Ok(None)
        }
    }
}

/// SHA-256 hex digest of a file's bytes.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// sync_tree
// ---------------------------------------------------------------------------

/// Converge the build tree onto the source tree using the real filesystem.
pub fn sync_tree(request: &SyncRequest) -> Result<SyncReport, SyncError> {
    sync_tree_with(request, &LocalFs)
}

/// [`sync_tree`] with explicit filesystem operations.
pub fn sync_tree_with(request: &SyncRequest, ops: &dyn FileOps) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    let source = scan_source(&request.source_root, &request.exclusions)?;
    let build = scan_build(&request.build_root, &request.exclusions, !request.dry_run)?;
    let plan = diff_trees(&source, &build);

    let mut report = SyncReport {
        source_root: request.source_root.clone(),
        build_root: request.build_root.clone(),
        failures: plan.failures.clone(),
        dry_run: request.dry_run,
        ..SyncReport::default()
    };

    if request.dry_run {
        record_planned(&plan, &mut report);
    } else {
        apply_deletions(&plan, ops, &mut report);
        apply_copies(&plan, ops, &mut report);
    }

    report.elapsed = started.elapsed();
    tracing::info!(
        source = %request.source_root.display(),
        build = %request.build_root.display(),
        copied = report.copied.len(),
        deleted = report.deleted.len(),
        failed = report.failures.len(),
        dry_run = request.dry_run,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "sync finished",
    );
    Ok(report)
}

fn record_planned(plan: &SyncPlan, report: &mut SyncReport) {
    for deletion in &plan.deletions {
        match deletion.kind {
            EntryKind::Dir => report.dirs_removed.push(deletion.path.clone()),
            _ => report.deleted.push(deletion.path.clone()),
        }
    }
    for copy in &plan.copies {
        match copy.kind {
            EntryKind::Dir => report.dirs_created.push(copy.path.clone()),
            _ => report.copied.push(copy.path.clone()),
        }
    }
}

fn apply_deletions(plan: &SyncPlan, ops: &dyn FileOps, report: &mut SyncReport) {
    for deletion in &plan.deletions {
        let target = plan.build_root.join(&deletion.path);
        match deletion.kind {
            EntryKind::Dir => {
                let removed = if deletion.replaced {
                    ops.remove_dir_all(&target)
                } else {
                    match dir_is_empty(&target) {
                        Ok(true) => ops.remove_dir(&target),
                        Ok(false) => {
                            tracing::debug!(
                                path = %deletion.path.display(),
                                "keeping non-empty stale directory"
                            );
                            continue;
                        }
                        Err(err) => Err(err),
                    }
                };
                match removed {
                    Ok(()) => report.dirs_removed.push(deletion.path.clone()),
                    Err(err) => report
                        .failures
                        .push(FailedEntry::new(&deletion.path, FileOp::Delete, err)),
                }
            }
            EntryKind::File | EntryKind::Symlink => match ops.remove_file(&target) {
                Ok(()) => {
                    tracing::debug!(path = %deletion.path.display(), "deleted");
                    report.deleted.push(deletion.path.clone());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => report
                    .failures
                    .push(FailedEntry::new(&deletion.path, FileOp::Delete, err)),
            },
        }
    }
}

fn apply_copies(plan: &SyncPlan, ops: &dyn FileOps, report: &mut SyncReport) {
    for copy in &plan.copies {
        let from = plan.source_root.join(&copy.path);
        let to = plan.build_root.join(&copy.path);
        let result = match copy.kind {
            EntryKind::Dir => ops
                .create_dir(&to)
                .map(|()| report.dirs_created.push(copy.path.clone()))
                .map_err(|err| FailedEntry::new(&copy.path, FileOp::CreateDir, err)),
            EntryKind::File => ops
                .copy_file(&from, &to)
                .map(|()| report.copied.push(copy.path.clone()))
                .map_err(|err| FailedEntry::new(&copy.path, FileOp::Copy, err)),
            EntryKind::Symlink => replace_symlink(ops, copy, &to)
                .map(|()| report.copied.push(copy.path.clone()))
                .map_err(|err| FailedEntry::new(&copy.path, FileOp::Symlink, err)),
        };
        match result {
            Ok(()) => tracing::debug!(path = %copy.path.display(), reason = ?copy.reason, "copied"),
            Err(failure) => {
                tracing::warn!(
                    path = %failure.path.display(),
                    op = %failure.op,
                    error = %failure.error,
                    "entry failed"
                );
                report.failures.push(failure);
            }
        }
    }
}

fn replace_symlink(ops: &dyn FileOps, copy: &PlannedCopy, to: &Path) -> io::Result<()> {
    let target = copy
        .link_target
        .as_deref()
        .ok_or_else(|| io::Error::other("symlink without target"))?;
    if copy.reason == ChangeReason::LinkTarget {
        ops.remove_file(to)?;
    }
    ops.symlink(target, to)
}

fn dir_is_empty(path: &Path) -> io::Result<bool> {
    Ok(std::fs::read_dir(path)?.next().is_none())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
