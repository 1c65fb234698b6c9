//! One sync per build tree at a time.
//!
//! The lock is a file at `<state_dir>/locks/<key>.lock`, where `key` is a
//! digest of the canonical build root, created with `create_new` and removed
//! when the guard drops. A lock left behind by a killed process is reclaimed
//! as soon as its pid is gone, or once it is older than [`STALE_AFTER_SECS`].

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::{error::io_err, SyncError};

/// Age in seconds after which an existing lock is treated as abandoned.
pub const STALE_AFTER_SECS: i64 = 600;

/// Held run lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

/// Lock file path for `build_root`.
pub fn lock_path(state_dir: &Path, build_root: &Path) -> PathBuf {
    let canonical = canonical_key(build_root);
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let key = hex::encode(&digest[..8]);
    state_dir.join("locks").join(format!("{key}.lock"))
}

impl RunLock {
    /// Take the lock for `build_root`, failing with [`SyncError::Locked`] if
    /// another live run holds it.
    pub fn acquire(state_dir: &Path, build_root: &Path) -> Result<Self, SyncError> {
        Self::acquire_at(state_dir, build_root, Utc::now())
    }

    fn acquire_at(
        state_dir: &Path,
        build_root: &Path,
        now: DateTime<Utc>,
    ) -> Result<Self, SyncError> {
        let path = lock_path(state_dir, build_root);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        match try_create(&path, build_root, now) {
            Ok(()) => Ok(Self { path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path).unwrap_or_default();
                if is_stale(&holder, now) {
                    tracing::warn!(lock = %path.display(), "reclaiming stale sync lock");
                    std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                    try_create(&path, build_root, now).map_err(|e| io_err(&path, e))?;
                    return Ok(Self { path });
                }
                Err(SyncError::Locked {
                    path,
                    holder: holder_summary(&holder),
                })
            }
            Err(err) => Err(io_err(&path, err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    lock = %self.path.display(),
                    error = %err,
                    "failed to release sync lock"
                );
            }
        }
    }
}

/// Canonicalize the deepest existing ancestor, so a build root keys the same
/// before and after its first sync creates it.
fn canonical_key(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut cursor = path;
    loop {
        if let Ok(canonical) = std::fs::canonicalize(cursor) {
            return missing.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (cursor.parent(), cursor.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                cursor = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn try_create(path: &Path, build_root: &Path, now: DateTime<Utc>) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "pid={}", std::process::id())?;
    writeln!(file, "build={}", build_root.display())?;
    writeln!(file, "acquired_at={}", now.to_rfc3339())?;
    Ok(())
}

fn field<'a>(contents: &'a str, key: &str) -> Option<&'a str> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
}

fn is_stale(contents: &str, now: DateTime<Utc>) -> bool {
    if let Some(pid) = field(contents, "pid").and_then(|raw| raw.trim().parse::<u32>().ok()) {
        if !process_alive(pid) {
            return true;
        }
    }
    match field(contents, "acquired_at").and_then(|raw| DateTime::parse_from_rfc3339(raw).ok()) {
        Some(acquired) => now - acquired.with_timezone(&Utc) > Duration::seconds(STALE_AFTER_SECS),
        // Unreadable or half-written; the writer may still be mid-create.
        None => false,
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks that the pid exists.
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

fn holder_summary(contents: &str) -> String {
    match (field(contents, "pid"), field(contents, "acquired_at")) {
        (Some(pid), Some(at)) => format!("pid {pid} since {at}"),
        (Some(pid), None) => format!("pid {pid}"),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_refused_until_drop() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        std::fs::create_dir_all(&build).unwrap();
        let state = tmp.path().join("state");

        let held = RunLock::acquire(&state, &build).expect("first");
        let err = RunLock::acquire(&state, &build).unwrap_err();
        match err {
            SyncError::Locked { holder, .. } => {
                assert!(holder.contains(&std::process::id().to_string()), "{holder}")
            }
            other => panic!("expected Locked, got {other:?}"),
        }

        drop(held);
        assert!(RunLock::acquire(&state, &build).is_ok());
    }

    #[test]
    fn different_build_roots_do_not_contend() {
        let tmp = TempDir::new().unwrap();
        let state = tmp.path().join("state");
        let _a = RunLock::acquire(&state, &tmp.path().join("a")).expect("a");
        let _b = RunLock::acquire(&state, &tmp.path().join("b")).expect("b");
    }

    #[test]
    fn lock_file_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let lock = RunLock::acquire(tmp.path(), tmp.path()).expect("lock");
        let path = lock.path().to_path_buf();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        let path = lock_path(tmp.path(), &build);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let old = Utc::now() - Duration::hours(1);
        std::fs::write(&path, format!("pid=1\nacquired_at={}\n", old.to_rfc3339())).unwrap();

        let lock = RunLock::acquire(tmp.path(), &build).expect("reclaimed");
        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert!(contents.contains(&format!("pid={}", std::process::id())));
    }

    #[test]
    fn key_is_stable_across_build_root_creation() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build").join("api");
        let before = lock_path(tmp.path(), &build);
        std::fs::create_dir_all(&build).unwrap();
        assert_eq!(before, lock_path(tmp.path(), &build));
    }

    #[test]
    fn lock_without_timestamp_is_not_stale() {
        let own = format!("pid={}\n", std::process::id());
        assert!(!is_stale(&own, Utc::now()));
        assert_eq!(holder_summary("pid=42\n"), "pid 42");
    }

    #[test]
    #[cfg(unix)]
    fn lock_of_dead_process_is_reclaimed() {
        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        let dead = child.id();
        child.wait().expect("wait");

        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        let path = lock_path(tmp.path(), &build);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let fresh = Utc::now().to_rfc3339();
        std::fs::write(&path, format!("pid={dead}\nacquired_at={fresh}\n")).unwrap();

        let lock = RunLock::acquire(tmp.path(), &build).expect("reclaimed");
        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert!(contents.contains(&format!("pid={}", std::process::id())));
    }

    #[test]
    fn fresh_lock_of_live_process_is_kept() {
        let now = Utc::now();
        let own = format!("pid={}\nacquired_at={}\n", std::process::id(), now.to_rfc3339());
        assert!(!is_stale(&own, now));
    }
}
