//! Ephemeral working copies.
//!
//! A [`WorkingCopy`] owns one on-disk checkout for the duration of a turn.
//! Any stale directory at its path is removed before use, and the directory is
//! removed again on release, or on drop if release never happened.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{AcquisitionError, CleanupWarning};

/// Scoped ownership of a working-copy directory.
pub struct WorkingCopy {
    /// Directory the repository is checked out into.
    path: PathBuf,
    /// Whether the directory still needs removing.
    active: bool,
}

impl WorkingCopy {
    /// Claims `path` for a new working copy.
    ///
    /// Removes whatever a previous run left there, fixing permissions if a
    /// plain removal is refused, and creates the parent directory.
    pub fn prepare(path: impl Into<PathBuf>) -> Result<Self, AcquisitionError> {
        let path = path.into();

        if fs::symlink_metadata(&path).is_ok() {
            info!(path = %path.display(), "Removing stale working copy");
            force_remove(&path).map_err(|source| AcquisitionError::StaleCopy {
                path: path.clone(),
                source,
            })?;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self { path, active: true })
    }

    /// Path of the working copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the working copy.
    pub fn release(mut self) -> Result<(), CleanupWarning> {
        self.active = false;
        remove_if_present(&self.path)
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.active {
            warn!(path = %self.path.display(), "Working copy was not released; removing on drop");
            if let Err(warning) = remove_if_present(&self.path) {
                warn!("{}", warning);
            }
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), CleanupWarning> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(());
    }

    info!(path = %path.display(), "Deleting working copy");
    force_remove(path).map_err(|source| CleanupWarning {
        path: path.to_path_buf(),
        source,
    })
}

/// Removes a file or tree, retrying once after making everything writable.
pub fn force_remove(path: &Path) -> io::Result<()> {
    match remove_path(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            debug!(
                path = %path.display(),
                error = %e,
                "Removal refused; fixing permissions and retrying"
            );
            make_writable(path);
            remove_path(path)
        }
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Grants the owner full access to every entry under `path`.
///
/// Best effort: entries that cannot be changed are skipped.
fn make_writable(path: &Path) {
    for entry in WalkDir::new(path).follow_links(false).into_iter().filter_map(Result::ok) {
        if entry.path_is_symlink() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let mut perms = meta.permissions();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = perms.mode();
            let owner = if meta.is_dir() { 0o700 } else { 0o600 };
            perms.set_mode(mode | owner);
        }
        #[cfg(not(unix))]
        {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
        }

        if let Err(e) = fs::set_permissions(entry.path(), perms) {
            debug!(path = %entry.path().display(), error = %e, "Could not fix permissions");
        }
    }
}
