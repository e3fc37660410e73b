//! Run configuration for the analysis orchestrator.
//!
//! Everything a run depends on (discovery mode, filters, limits, paths and the
//! tool invocation) lives in one explicit struct loaded from YAML, instead of
//! being looked up ad hoc from the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default location of the run configuration, relative to the project root.
pub const DEFAULT_CONFIG_PATH: &str = "config/repos.yaml";

/// Default transformation executed against each repository.
pub const DEFAULT_TRANSFORMATION: &str = "AWS/early-access-comprehensive-codebase-analysis";

/// A single fixed repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleRepoConfig {
    pub name: String,
    pub git_url: String,
}

/// Catalog filters for an organization scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFilters {
    #[serde(default)]
    pub exclude_archived: bool,
    #[serde(default)]
    pub exclude_forks: bool,
    /// Keep only repositories using this language (case-insensitive).
    #[serde(default)]
    pub language: Option<String>,
}

/// Limits for an organization scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLimits {
    #[serde(default)]
    pub max_repos_per_run: Option<usize>,
}

/// Organization (or user) catalog scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgScanConfig {
    pub github_org: String,
    #[serde(default)]
    pub filters: ScanFilters,
    #[serde(default)]
    pub limits: ScanLimits,
}

/// How the repository list is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMode {
    Single(SingleRepoConfig),
    OrgScan(OrgScanConfig),
}

impl DiscoveryMode {
    /// Mode name as written in the config file.
    pub fn name(&self) -> &'static str {
        match self {
            DiscoveryMode::Single(_) => "single",
            DiscoveryMode::OrgScan(_) => "org_scan",
        }
    }
}

/// Filesystem layout of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Parent of all working copies.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Parent of per-repository artifacts and logs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// The status ledger file.
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("repos")
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from("repos/analysis_registry.yaml")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            output_dir: default_output_dir(),
            ledger_file: default_ledger_file(),
        }
    }
}

impl PathsConfig {
    /// Anchor relative paths at `root`, made absolute against the current
    /// directory.
    ///
    /// The tool runs with the working copy as its cwd, so every path handed to
    /// it must be absolute.
    pub fn resolve(&self, root: &Path) -> PathsConfig {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let anchor = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };
        PathsConfig {
            work_dir: anchor(&self.work_dir),
            output_dir: anchor(&self.output_dir),
            ledger_file: anchor(&self.ledger_file),
        }
    }

    /// Working copy location for `repo_name`.
    pub fn working_copy(&self, repo_name: &str) -> PathBuf {
        self.work_dir.join(repo_name)
    }

    /// Artifact destination for `repo_name`.
    pub fn artifact_dir(&self, repo_name: &str) -> PathBuf {
        self.output_dir.join(repo_name).join("analysis")
    }

    /// Tool log for `repo_name`.
    pub fn log_file(&self, repo_name: &str) -> PathBuf {
        self.output_dir.join(format!("{}_transform.log", repo_name))
    }
}

/// External tool invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_subcommand")]
    pub subcommand: Vec<String>,
    #[serde(default = "default_transformation")]
    pub transformation: String,
    /// Wall-clock ceiling in seconds; absent means wait indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_command() -> String {
    "atx".to_string()
}

fn default_subcommand() -> Vec<String> {
    vec!["custom".to_string(), "def".to_string(), "exec".to_string()]
}

fn default_transformation() -> String {
    DEFAULT_TRANSFORMATION.to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            subcommand: default_subcommand(),
            transformation: default_transformation(),
            timeout_secs: None,
        }
    }
}

impl ToolConfig {
    /// Timeout as a duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// The config file as written.
#[derive(Debug, Deserialize)]
struct RawConfig {
    mode: String,
    #[serde(default)]
    single: Option<SingleRepoConfig>,
    #[serde(default)]
    org_scan: Option<OrgScanConfig>,
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default)]
    tool: ToolConfig,
}

/// Complete configuration of an analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Discovery mode with its filters and limits.
    pub discovery: DiscoveryMode,
    /// Filesystem layout.
    pub paths: PathsConfig,
    /// External tool settings.
    pub tool: ToolConfig,
}

impl AnalyzerConfig {
    /// Configuration for a single repository with default paths and tool.
    pub fn single(name: impl Into<String>, git_url: impl Into<String>) -> Self {
        Self {
            discovery: DiscoveryMode::Single(SingleRepoConfig {
                name: name.into(),
                git_url: git_url.into(),
            }),
            paths: PathsConfig::default(),
            tool: ToolConfig::default(),
        }
    }

    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;

        let discovery = match raw.mode.as_str() {
            "single" => DiscoveryMode::Single(raw.single.ok_or_else(|| {
                ConfigError::ValidationFailed(
                    "mode 'single' requires a 'single' section".to_string(),
                )
            })?),
            "org_scan" => DiscoveryMode::OrgScan(raw.org_scan.ok_or_else(|| {
                ConfigError::ValidationFailed(
                    "mode 'org_scan' requires an 'org_scan' section".to_string(),
                )
            })?),
            other => {
                return Err(ConfigError::ValidationFailed(format!("Unknown mode: {}", other)));
            }
        };

        let config = Self {
            discovery,
            paths: raw.paths,
            tool: raw.tool,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.discovery {
            DiscoveryMode::Single(single) => {
                if single.name.trim().is_empty() {
                    return Err(ConfigError::ValidationFailed(
                        "single.name cannot be empty".to_string(),
                    ));
                }
                if single.git_url.trim().is_empty() {
                    return Err(ConfigError::ValidationFailed(
                        "single.git_url cannot be empty".to_string(),
                    ));
                }
            }
            DiscoveryMode::OrgScan(org) => {
                if org.github_org.trim().is_empty() {
                    return Err(ConfigError::ValidationFailed(
                        "org_scan.github_org cannot be empty".to_string(),
                    ));
                }
                if org.limits.max_repos_per_run == Some(0) {
                    return Err(ConfigError::ValidationFailed(
                        "max_repos_per_run must be greater than 0".to_string(),
                    ));
                }
            }
        }

        if self.tool.command.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "tool.command cannot be empty".to_string(),
            ));
        }

        if self.tool.transformation.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "tool.transformation cannot be empty".to_string(),
            ));
        }

        if self.tool.timeout_secs == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "tool.timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the filesystem layout.
    pub fn with_paths(mut self, paths: PathsConfig) -> Self {
        self.paths = paths;
        self
    }

    /// Builder method to set the tool settings.
    pub fn with_tool(mut self, tool: ToolConfig) -> Self {
        self.tool = tool;
        self
    }
}
