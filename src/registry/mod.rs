//! Analysis registry: the durable status ledger.
//!
//! This module provides:
//! - One [`LedgerEntry`] per repository name, kept in discovery order
//! - Idempotent upsert of status transitions
//! - Whole-file atomic rewrites so a reader never sees a half-written ledger

pub mod entry;

pub use entry::{LedgerEntry, RepoStatus, UNKNOWN_LANGUAGE};

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    repos: Vec<LedgerEntry>,
}

/// Keyed record of every repository's last-known analysis state.
pub struct AnalysisRegistry {
    /// Path of the ledger file.
    path: PathBuf,
    /// Entries in first-seen order.
    entries: Vec<LedgerEntry>,
}

impl AnalysisRegistry {
    /// Create an empty registry that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the registry from disk.
    ///
    /// A missing or empty file yields an empty registry. A file that cannot be
    /// parsed is reported as [`LedgerError::Corrupt`].
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        if !path.exists() {
            return Ok(Self::new(path));
        }

        let contents = fs::read_to_string(&path)?;
        if contents.trim().is_empty() {
            return Ok(Self::new(path));
        }

        let document: Option<LedgerDocument> =
            serde_yaml::from_str(&contents).map_err(|e| LedgerError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let mut registry = Self::new(path);
        for entry in document.unwrap_or_default().repos {
            // Hand edits may duplicate a name; the last record wins.
            match registry.position(&entry.repo_name) {
                Some(idx) => registry.entries[idx] = entry,
                None => registry.entries.push(entry),
            }
        }

        debug!(path = %registry.path.display(), entries = registry.entries.len(), "Loaded ledger");
        Ok(registry)
    }

    /// Rewrite the whole ledger file.
    ///
    /// The document is written to a temporary file in the same directory and
    /// renamed over the target.
    pub fn save(&self) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let document = LedgerDocument {
            repos: self.entries.clone(),
        };
        let contents = serde_yaml::to_string(&document)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| LedgerError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;

        Ok(())
    }

    /// Insert or update the entry for `repo_name`.
    ///
    /// An existing entry always gets the new status and a fresh timestamp. Its
    /// language is replaced only by a non-default value and its notes only by
    /// explicit notes; a transition to `analyzed` without notes clears any
    /// stale notes.
    pub fn upsert(
        &mut self,
        repo_name: &str,
        git_url: &str,
        status: RepoStatus,
        language: Option<&str>,
        notes: Option<String>,
    ) -> &LedgerEntry {
        let language = language.filter(|l| !l.is_empty() && *l != UNKNOWN_LANGUAGE);

        let idx = match self.position(repo_name) {
            Some(idx) => {
                let entry = &mut self.entries[idx];
                entry.analysis_status = status;
                entry.analysis_date = Utc::now();
                if let Some(lang) = language {
                    entry.language = lang.to_string();
                }
                if notes.is_some() {
                    entry.notes = notes;
                } else if status == RepoStatus::Analyzed {
                    entry.notes = None;
                }
                idx
            }
            None => {
                let mut entry = LedgerEntry::new(repo_name, git_url, status);
                if let Some(lang) = language {
                    entry.language = lang.to_string();
                }
                entry.notes = notes;
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };

        &self.entries[idx]
    }

    /// Names of all repositories currently at `status`.
    pub fn find_by_status(&self, status: RepoStatus) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|entry| entry.analysis_status == status)
            .map(|entry| entry.repo_name.clone())
            .collect()
    }

    /// Get an entry by repository name.
    pub fn get(&self, repo_name: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.repo_name == repo_name)
    }

    /// All entries in ledger order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, repo_name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.repo_name == repo_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_path(dir: &TempDir) -> PathBuf {
        dir.path().join("repos").join("analysis_registry.yaml")
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = AnalysisRegistry::load(ledger_path(&dir)).expect("load should succeed");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_empty_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.yaml");
        fs::write(&path, "\n").unwrap();
        let registry = AnalysisRegistry::load(&path).expect("load should succeed");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.yaml");
        fs::write(&path, "repos: [this is: {not valid").unwrap();

        let result = AnalysisRegistry::load(&path);
        assert!(matches!(result, Err(LedgerError::Corrupt { .. })));
    }

    #[test]
    fn test_load_unknown_status_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.yaml");
        fs::write(
            &path,
            concat!(
                "repos:\n",
                "- repo_name: a\n",
                "  git_url: u\n",
                "  analysis_status: done\n",
                "  analysis_date: 2024-01-01T00:00:00Z\n",
            ),
        )
        .unwrap();

        let result = AnalysisRegistry::load(&path);
        assert!(matches!(result, Err(LedgerError::Corrupt { .. })));
    }

    #[test]
    fn test_upsert_creates_with_defaults() {
        let mut registry = AnalysisRegistry::new("/tmp/unused.yaml");
        let entry = registry.upsert("svc", "https://x/svc.git", RepoStatus::Pending, None, None);
        assert_eq!(entry.language, "unknown");
        assert_eq!(entry.analysis_status, RepoStatus::Pending);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let mut registry = AnalysisRegistry::new("/tmp/unused.yaml");
        registry.upsert("svc", "u", RepoStatus::Pending, None, None);
        registry.upsert("svc", "u", RepoStatus::Running, None, None);
        registry.upsert("other", "u2", RepoStatus::Pending, None, None);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("svc").unwrap().analysis_status, RepoStatus::Running);
        assert_eq!(registry.entries()[0].repo_name, "svc");
    }

    #[test]
    fn test_upsert_keeps_language_unless_overridden() {
        let mut registry = AnalysisRegistry::new("/tmp/unused.yaml");
        registry.upsert("svc", "u", RepoStatus::Pending, Some("Java"), None);
        registry.upsert("svc", "u", RepoStatus::Running, Some("unknown"), None);
        assert_eq!(registry.get("svc").unwrap().language, "Java");

        registry.upsert("svc", "u", RepoStatus::Running, Some("Kotlin"), None);
        assert_eq!(registry.get("svc").unwrap().language, "Kotlin");
    }

    #[test]
    fn test_analyzed_without_notes_clears_stale_notes() {
        let mut registry = AnalysisRegistry::new("/tmp/unused.yaml");
        registry.upsert("svc", "u", RepoStatus::Failed, None, Some("clone failed".to_string()));
        registry.upsert("svc", "u", RepoStatus::Running, None, None);
        assert_eq!(registry.get("svc").unwrap().notes.as_deref(), Some("clone failed"));

        registry.upsert("svc", "u", RepoStatus::Analyzed, None, None);
        assert!(registry.get("svc").unwrap().notes.is_none());
    }

    #[test]
    fn test_find_by_status() {
        let mut registry = AnalysisRegistry::new("/tmp/unused.yaml");
        registry.upsert("a", "u", RepoStatus::Analyzed, None, None);
        registry.upsert("b", "u", RepoStatus::Failed, None, None);
        registry.upsert("c", "u", RepoStatus::Analyzed, None, None);

        let analyzed = registry.find_by_status(RepoStatus::Analyzed);
        assert_eq!(analyzed.len(), 2);
        assert!(analyzed.contains("a"));
        assert!(analyzed.contains("c"));
        assert!(registry.find_by_status(RepoStatus::Running).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(&dir);

        {
            let mut registry = AnalysisRegistry::new(&path);
            registry.upsert("b-repo", "u1", RepoStatus::Analyzed, None, None);
            registry.upsert("a-repo", "u2", RepoStatus::Failed, None, Some("see log".to_string()));
            registry.save().expect("save should succeed");
        }

        let registry = AnalysisRegistry::load(&path).expect("load should succeed");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entries()[0].repo_name, "b-repo");
        assert_eq!(registry.get("a-repo").unwrap().notes.as_deref(), Some("see log"));

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("repos:"));
        assert!(raw.contains("analysis_status: failed"));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.yaml");
        let mut registry = AnalysisRegistry::new(&path);
        registry.upsert("svc", "u", RepoStatus::Pending, None, None);
        registry.save().unwrap();
        registry.upsert("svc", "u", RepoStatus::Running, None, None);
        registry.save().unwrap();

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_load_hand_written_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.yaml");
        fs::write(
            &path,
            concat!(
                "repos:\n",
                "- repo_name: legacy\n",
                "  git_url: https://x/legacy.git\n",
                "  analysis_status: analyzed\n",
                "  analysis_date: 2024-05-01T10:00:00Z\n",
            ),
        )
        .unwrap();

        let registry = AnalysisRegistry::load(&path).unwrap();
        let entry = registry.get("legacy").unwrap();
        assert_eq!(entry.language, "unknown");
        assert_eq!(entry.analysis_status, RepoStatus::Analyzed);
    }
}
