//! Batch pipeline: configuration and the run orchestrator.
//!
//! # Example
//!
//! ```rust,ignore
//! use repo_analyzer::discovery::discover_repos;
//! use repo_analyzer::pipeline::{AnalyzerConfig, Orchestrator};
//! use std::path::Path;
//!
//! let config = AnalyzerConfig::from_file(Path::new("config/repos.yaml"))?;
//! let repos = discover_repos(&config.discovery, token.as_deref()).await?;
//!
//! let mut orchestrator = Orchestrator::from_config(&config, Path::new("."))?;
//! let summary = orchestrator.run(&repos).await?;
//! std::process::exit(summary.exit_code());
//! ```

pub mod config;
pub mod orchestrator;

pub use config::{
    AnalyzerConfig, DiscoveryMode, OrgScanConfig, PathsConfig, ScanFilters, ScanLimits,
    SingleRepoConfig, ToolConfig,
};
pub use orchestrator::{BatchSummary, Orchestrator, RepoOutcome};
