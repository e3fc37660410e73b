//! Error types for repo-analyzer operations.
//!
//! One enum per failure category of a batch run:
//! - Discovery of the repository list (batch-fatal)
//! - Acquisition of a working copy (fatal to one repository only)
//! - External tool invocation (deferred to the success evaluator)
//! - Artifact collection and working-copy cleanup (warnings, never fatal)
//! - The persisted status ledger (corruption is fatal at startup)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that prevent the repository list from being enumerated.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("GITHUB_TOKEN is required for org_scan mode; set it in .env or the environment")]
    MissingToken,

    #[error("Failed to access organization or user '{target}': {message}")]
    CatalogAccess { target: String, message: String },

    #[error("Catalog request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected catalog response: {0}")]
    InvalidResponse(String),
}

/// Errors that prevent a working copy from being materialized.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Failed to remove stale working copy at {path}: {source}")]
    StaleCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch {source_location}: {message}")]
    Fetch {
        source_location: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the external analysis tool invocation.
///
/// These never decide a repository's outcome on their own; output may still
/// exist and is always evaluated afterwards.
#[derive(Debug, Error)]
pub enum ToolInvocationError {
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process error: {0}")]
    Wait(std::io::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

/// A single artifact that could not be copied.
#[derive(Debug, Error)]
#[error("Failed to copy artifact {path}: {source}")]
pub struct CollectionWarning {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A working copy that could not be fully removed.
#[derive(Debug, Error)]
#[error("Failed to remove working copy {path}: {source}")]
pub struct CleanupWarning {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors from the persisted status ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to persist ledger to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}
