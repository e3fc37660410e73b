//! Command-line interface for repo-analyzer.
//!
//! Provides commands for running an analysis batch, previewing discovery and
//! inspecting the ledger.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
