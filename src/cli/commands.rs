//! CLI command definitions for repo-analyzer.
//!
//! `run` processes the discovered batch, `discover` only lists what a run
//! would process, and `status` prints the ledger.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::discovery::{discover_repos, RepositoryRef};
use crate::pipeline::config::DEFAULT_CONFIG_PATH;
use crate::pipeline::{AnalyzerConfig, BatchSummary, Orchestrator};
use crate::registry::{AnalysisRegistry, LedgerEntry, RepoStatus};

/// Batch codebase analysis over a set of repositories.
#[derive(Parser)]
#[command(name = "repo-analyzer")]
#[command(about = "Run codebase analysis across repositories and track results in a ledger")]
#[command(version)]
#[command(
    long_about = "repo-analyzer discovers repositories (a single configured repository or a GitHub organization scan), runs the analysis transformation on a fresh clone of each, collects the produced artifacts and records every repository's status in a YAML ledger.\n\nExample usage:\n  repo-analyzer --config config/repos.yaml run\n  repo-analyzer status --status failed"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Project root; relative config and data paths resolve against it.
    #[arg(long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Run configuration file (default: <root>/config/repos.yaml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// GitHub token for organization scans (can also be set via GITHUB_TOKEN or .env).
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub github_token: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Analyze every discovered repository not yet analyzed.
    Run(RunArgs),

    /// List the repositories a run would process.
    Discover(DiscoverArgs),

    /// Print the analysis ledger.
    Status(StatusArgs),
}

/// Arguments for `repo-analyzer run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Re-analyze repositories already recorded as analyzed.
    #[arg(short, long)]
    pub force: bool,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `repo-analyzer discover`.
#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `repo-analyzer status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Only show repositories with this status (pending, running, analyzed, failed).
    #[arg(short, long)]
    pub status: Option<RepoStatus>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // A .env in the project root supplements the one loaded from the cwd.
    dotenvy::from_path(cli.root.join(".env")).ok();
    let github_token = cli
        .github_token
        .clone()
        .or_else(|| std::env::var("GITHUB_TOKEN").ok());

    let config_path = config_path(&cli.root, cli.config.as_deref());

    match cli.command {
        Commands::Run(args) => {
            let config = load_config(&config_path)?;
            let exit_code =
                run_batch_command(&config, &cli.root, github_token.as_deref(), args).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Commands::Discover(args) => {
            let config = load_config(&config_path)?;
            run_discover_command(&config, github_token.as_deref(), args).await?;
        }
        Commands::Status(args) => {
            let config = load_config(&config_path)?;
            run_status_command(&config, &cli.root, args)?;
        }
    }
    Ok(())
}

fn config_path(root: &Path, config: Option<&Path>) -> PathBuf {
    match config {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => root.join(path),
        None => root.join(DEFAULT_CONFIG_PATH),
    }
}

fn load_config(path: &Path) -> anyhow::Result<AnalyzerConfig> {
    let config = AnalyzerConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!(mode = config.discovery.name(), "Loaded configuration from {}", path.display());
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_batch_command(
    config: &AnalyzerConfig,
    root: &Path,
    github_token: Option<&str>,
    args: RunArgs,
) -> anyhow::Result<i32> {
    let mut orchestrator = Orchestrator::from_config(config, root)
        .context("Refusing to run: the analysis ledger could not be loaded")?
        .with_force(args.force);

    let repos = discover_repos(&config.discovery, github_token)
        .await
        .context("Repository discovery failed")?;

    if repos.is_empty() {
        warn!("Discovery returned no repositories");
    }

    let summary = orchestrator
        .run(&repos)
        .await
        .context("Failed to persist the analysis ledger")?;

    if args.json {
        let json = serde_json::to_string_pretty(&summary)?;
        println!("{json}");
    } else {
        print_summary(&summary);
    }

    Ok(summary.exit_code())
}

fn print_summary(summary: &BatchSummary) {
    println!("\n=== Analysis Batch {} ===", summary.run_id);
    println!("Analyzed:       {}", summary.analyzed());
    println!("Failed:         {}", summary.failed());
    println!("Skipped:        {}", summary.skipped.len());
    println!();

    for outcome in &summary.outcomes {
        let marker = match outcome.status {
            RepoStatus::Analyzed => "✓",
            _ => "✗",
        };
        println!("  {} {} [{}]", marker, outcome.repo_name, outcome.status);
        println!("    {}", outcome.notes);
    }

    if summary.has_uncorroborated_failure() {
        println!("\nOne or more repositories failed; see the ledger notes and log files.");
    }
}

#[derive(Serialize)]
struct DiscoverOutput<'a> {
    mode: &'static str,
    count: usize,
    repos: &'a [RepositoryRef],
}

async fn run_discover_command(
    config: &AnalyzerConfig,
    github_token: Option<&str>,
    args: DiscoverArgs,
) -> anyhow::Result<()> {
    let repos = discover_repos(&config.discovery, github_token)
        .await
        .context("Repository discovery failed")?;

    if args.json {
        let output = DiscoverOutput {
            mode: config.discovery.name(),
            count: repos.len(),
            repos: &repos,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Found {} repository(ies):", repos.len());
        for repo in &repos {
            println!("  {} -> {}", repo.name, repo.source_location);
        }
    }
    Ok(())
}

fn run_status_command(
    config: &AnalyzerConfig,
    root: &Path,
    args: StatusArgs,
) -> anyhow::Result<()> {
    let paths = config.paths.resolve(root);
    let registry = AnalysisRegistry::load(&paths.ledger_file)
        .with_context(|| format!("Failed to load ledger {}", paths.ledger_file.display()))?;

    let entries = filter_entries(&registry, args.status);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No ledger entries.");
        return Ok(());
    }

    for entry in entries {
        println!(
            "{:<40} {:<9} {}",
            entry.repo_name,
            entry.analysis_status,
            entry.analysis_date.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(notes) = &entry.notes {
            println!("    {}", notes);
        }
    }
    Ok(())
}

fn filter_entries(registry: &AnalysisRegistry, status: Option<RepoStatus>) -> Vec<&LedgerEntry> {
    match status {
        Some(status) => {
            let names = registry.find_by_status(status);
            registry
                .entries()
                .iter()
                .filter(|e| names.contains(&e.repo_name))
                .collect()
        }
        None => registry.entries().iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::try_parse_from([
            "repo-analyzer",
            "--root",
            "/project",
            "run",
            "--force",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.root, PathBuf::from("/project"));
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Run(args) => {
                assert!(args.force);
                assert!(!args.json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_status_filter() {
        let cli = Cli::try_parse_from(["repo-analyzer", "status", "--status", "failed"]).unwrap();
        match cli.command {
            Commands::Status(args) => assert_eq!(args.status, Some(RepoStatus::Failed)),
            _ => panic!("expected status"),
        }

        assert!(Cli::try_parse_from(["repo-analyzer", "status", "--status", "bogus"]).is_err());
    }

    #[test]
    fn test_config_path_resolution() {
        let root = Path::new("/project");
        assert_eq!(config_path(root, None), PathBuf::from("/project/config/repos.yaml"));
        assert_eq!(
            config_path(root, Some(Path::new("alt.yaml"))),
            PathBuf::from("/project/alt.yaml")
        );
        assert_eq!(
            config_path(root, Some(Path::new("/etc/ra.yaml"))),
            PathBuf::from("/etc/ra.yaml")
        );
    }

    #[test]
    fn test_filter_entries_keeps_ledger_order() {
        let mut registry = AnalysisRegistry::new("unused.yaml");
        registry.upsert("b", "u", RepoStatus::Failed, None, None);
        registry.upsert("a", "u", RepoStatus::Analyzed, None, None);
        registry.upsert("c", "u", RepoStatus::Failed, None, None);

        let failed: Vec<_> = filter_entries(&registry, Some(RepoStatus::Failed))
            .iter()
            .map(|e| e.repo_name.as_str())
            .collect();
        assert_eq!(failed, vec!["b", "c"]);
        assert_eq!(filter_entries(&registry, None).len(), 3);
    }
}
