//! Collection of tool-generated artifacts out of a working copy.
//!
//! Matching top-level entries are copied into a durable destination. Directory
//! copies merge into whatever an earlier collection left there.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::CollectionWarning;

use super::evaluator::{OutputMarker, PRIMARY_OUTPUT_PREFIX};

/// Version-control metadata never collected.
const VCS_DIR: &str = ".git";

/// Copies recognized output markers from a working copy.
#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    markers: Vec<String>,
    prefix: Option<String>,
}

impl Default for ArtifactCollector {
    fn default() -> Self {
        Self::new(
            OutputMarker::ALL.iter().map(|m| m.dir_name().to_string()),
            Some(PRIMARY_OUTPUT_PREFIX),
        )
    }
}

impl ArtifactCollector {
    /// Creates a collector for exact `markers` plus an optional name `prefix`.
    pub fn new(markers: impl IntoIterator<Item = String>, prefix: Option<&str>) -> Self {
        Self {
            markers: markers.into_iter().collect(),
            prefix: prefix.map(String::from),
        }
    }

    /// Returns true if a top-level entry called `name` should be collected.
    pub fn matches(&self, name: &str) -> bool {
        if name == VCS_DIR {
            return false;
        }
        self.markers.iter().any(|m| m == name)
            || self
                .prefix
                .as_deref()
                .is_some_and(|p| name.starts_with(p))
    }

    /// Copy matching children of `working_dir` into `destination_dir`.
    ///
    /// Returns the number of top-level items copied. A failed item is logged
    /// and skipped.
    pub fn collect(&self, working_dir: &Path, destination_dir: &Path) -> usize {
        let entries = match fs::read_dir(working_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %working_dir.display(), error = %e, "No working copy to collect from");
                return 0;
            }
        };

        if let Err(e) = fs::create_dir_all(destination_dir) {
            warn!(
                path = %destination_dir.display(),
                error = %e,
                "Failed to create artifact directory"
            );
            return 0;
        }

        let mut copied = 0;
        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !self.matches(&name) {
                continue;
            }

            let src = entry.path();
            let dest = destination_dir.join(entry.file_name());
            match copy_item(&src, &dest) {
                Ok(()) => {
                    copied += 1;
                    info!("Copied {}/", name);
                }
                Err(warning) => warn!("{}", warning),
            }
        }

        if copied == 0 {
            warn!(
                path = %working_dir.display(),
                "No standard output folders found. Check the log file."
            );
        }

        copied
    }
}

/// Copy a file or merge a directory tree.
fn copy_item(src: &Path, dest: &Path) -> Result<(), CollectionWarning> {
    let to_warning = |path: &Path, source: io::Error| CollectionWarning {
        path: path.to_path_buf(),
        source,
    };

    if !src.is_dir() {
        return copy_file(src, dest).map_err(|e| to_warning(src, e));
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            to_warning(&path, e.into())
        })?;

        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| to_warning(entry.path(), e))?;
        } else {
            copy_file(entry.path(), &target).map_err(|e| to_warning(entry.path(), e))?;
        }
    }

    Ok(())
}

/// Copy one file, keeping permissions and modification time.
fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    // A read-only copy from an earlier collection must still be overwritable.
    if let Ok(existing) = fs::metadata(dest) {
        let mut perms = existing.permissions();
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(dest, perms)?;
        }
    }

    let metadata = fs::metadata(src)?;
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dest)?;
    io::copy(&mut reader, &mut writer)?;
    writer.set_modified(metadata.modified()?)?;
    fs::set_permissions(dest, metadata.permissions())?;

    Ok(())
}
