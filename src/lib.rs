//! repo-analyzer: batch codebase analysis over many repositories.
//!
//! This library discovers repositories, runs an external analysis tool against
//! a fresh working copy of each, judges the outcome from the artifacts and log
//! the tool leaves behind, and records every repository's status in a durable
//! YAML ledger.

// Core modules
pub mod cli;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod runner;

// Re-export commonly used error types
pub use error::{
    AcquisitionError, CleanupWarning, CollectionWarning, ConfigError, DiscoveryError, LedgerError,
    ToolInvocationError,
};
