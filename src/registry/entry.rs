use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Language recorded when discovery did not supply one.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Status of a repository in its analysis lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Pending,
    Running,
    Analyzed,
    Failed,
}

impl RepoStatus {
    /// Returns true for the states a turn ends in.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RepoStatus::Analyzed | RepoStatus::Failed)
    }
}

impl std::fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoStatus::Pending => write!(f, "pending"),
            RepoStatus::Running => write!(f, "running"),
            RepoStatus::Analyzed => write!(f, "analyzed"),
            RepoStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RepoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RepoStatus::Pending),
            "running" => Ok(RepoStatus::Running),
            "analyzed" => Ok(RepoStatus::Analyzed),
            "failed" => Ok(RepoStatus::Failed),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

/// A single ledger record.
///
/// Field names match the hand-editable ledger file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique key.
    pub repo_name: String,
    /// Clone URL or local path the working copy is fetched from.
    pub git_url: String,
    /// Free-text language label.
    #[serde(default = "default_language")]
    pub language: String,
    /// Last-known status.
    pub analysis_status: RepoStatus,
    /// Time of the last status transition.
    pub analysis_date: DateTime<Utc>,
    /// Explanation of the last terminal transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_language() -> String {
    UNKNOWN_LANGUAGE.to_string()
}

impl LedgerEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(
        repo_name: impl Into<String>,
        git_url: impl Into<String>,
        status: RepoStatus,
    ) -> Self {
        Self {
            repo_name: repo_name.into(),
            git_url: git_url.into(),
            language: default_language(),
            analysis_status: status,
            analysis_date: Utc::now(),
            notes: None,
        }
    }
}
