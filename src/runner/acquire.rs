//! Materializing a working copy from a repository's source location.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::discovery::RepositoryRef;
use crate::error::AcquisitionError;

/// Fetches a repository into an empty target path.
#[async_trait]
pub trait RepoAcquirer: Send + Sync {
    /// Materialize `repo` at `target`. The target does not exist on entry.
    async fn acquire(&self, repo: &RepositoryRef, target: &Path) -> Result<(), AcquisitionError>;
}

/// Clones repositories with the `git` CLI.
pub struct GitAcquirer {
    program: String,
    depth: Option<u32>,
}

impl Default for GitAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl GitAcquirer {
    /// Creates an acquirer that performs full clones.
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
            depth: None,
        }
    }

    /// Limits clone history to `depth` commits.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Arguments passed to git for one clone.
    pub fn clone_args(&self, source: &str, target: &Path) -> Vec<String> {
        let mut args = vec!["clone".to_string()];
        if let Some(depth) = self.depth {
            args.push("--depth".to_string());
            args.push(depth.to_string());
        }
        args.push(source.to_string());
        args.push(target.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl RepoAcquirer for GitAcquirer {
    async fn acquire(&self, repo: &RepositoryRef, target: &Path) -> Result<(), AcquisitionError> {
        info!("Cloning {} to {}", repo.source_location, target.display());

        let output = Command::new(&self.program)
            .args(self.clone_args(&repo.source_location, target))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AcquisitionError::Fetch {
                source_location: repo.source_location.clone(),
                message: format!("failed to spawn {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquisitionError::Fetch {
                source_location: repo.source_location.clone(),
                message: format!(
                    "git clone exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            });
        }

        info!("Repository cloned successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_clone_args() {
        let acquirer = GitAcquirer::new();
        let args = acquirer.clone_args("https://x/svc.git", &PathBuf::from("/tmp/svc"));
        assert_eq!(args, vec!["clone", "https://x/svc.git", "/tmp/svc"]);
    }

    #[test]
    fn test_clone_args_with_depth() {
        let acquirer = GitAcquirer::new().with_depth(1);
        let args = acquirer.clone_args("u", &PathBuf::from("t"));
        assert_eq!(args, vec!["clone", "--depth", "1", "u", "t"]);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_fetch_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo = RepositoryRef::new("ghost", dir.path().join("does-not-exist").to_string_lossy());
        let result = GitAcquirer::new().acquire(&repo, &dir.path().join("out")).await;
        assert!(matches!(result, Err(AcquisitionError::Fetch { .. })));
    }
}
