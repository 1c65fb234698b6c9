//! Filesystem mutations performed by the mirror.
//!
//! Every write the engine makes into a build tree goes through [`FileOps`],
//! so a run can be exercised against injected failures.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Mutations applied to the build tree.
pub trait FileOps {
    /// Replace `to` with the content and permissions of `from`.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn create_dir(&self, path: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    /// Remove an empty directory.
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
    /// Remove a directory and everything below it.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileOps for LocalFs {
    /// Copy to a hidden sibling then rename over `to`, so the build tree
    /// never holds a half-written file under its real name.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let tmp = tmp_path(to);
        if let Err(err) = std::fs::copy(from, &tmp) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        if let Err(err) = std::fs::rename(&tmp, to) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(not(unix))]
    fn symlink(&self, _target: &Path, link: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot mirror symlink {}", link.display()),
        ))
    }
}

/// `<dir>/.<name>.stagehand.tmp` next to `path`.
///
/// A leftover from an interrupted run is an ordinary stale entry and is
/// deleted by the next sync.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".stagehand.tmp");
    path.with_file_name(name)
}
