//! Run orchestrator.
//!
//! Drives every discovered repository through one turn:
//!
//! ```text
//! pending -> acquire -> running -> invoke -> evaluate + collect -> analyzed | failed
//! ```
//!
//! Turns run sequentially in discovery order. The ledger is persisted after
//! every status transition, so an interrupted batch loses at most the
//! in-flight repository's progress.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::discovery::RepositoryRef;
use crate::error::{AcquisitionError, LedgerError, ToolInvocationError};
use crate::registry::{AnalysisRegistry, RepoStatus};
use crate::runner::{
    AnalysisTool, ArtifactCollector, Confidence, EvaluationResult, ExternalTool, GitAcquirer,
    RepoAcquirer, SuccessEvaluator, ToolExit, WorkingCopy,
};

use super::config::{AnalyzerConfig, PathsConfig};

/// Final disposition of one repository in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct RepoOutcome {
    pub repo_name: String,
    /// Terminal status written to the ledger.
    pub status: RepoStatus,
    /// Evaluator confidence; absent when acquisition failed.
    pub confidence: Option<Confidence>,
    /// Whether a working copy was obtained.
    pub acquired: bool,
    /// Whether the tool process errored (non-zero exit, spawn failure, timeout).
    pub process_errored: bool,
    /// Top-level artifacts copied to the destination directory.
    pub artifacts_copied: usize,
    /// Notes written to the ledger.
    pub notes: String,
}

impl RepoOutcome {
    /// A failure that no output evidence contradicts.
    pub fn is_uncorroborated_failure(&self) -> bool {
        self.status == RepoStatus::Failed && (!self.acquired || self.process_errored)
    }
}

/// Result of a complete batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    /// Repositories skipped because they were already analyzed.
    pub skipped: Vec<String>,
    /// One entry per processed repository, in processing order.
    pub outcomes: Vec<RepoOutcome>,
}

impl BatchSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            skipped: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Number of repositories that ended `analyzed`.
    pub fn analyzed(&self) -> usize {
        self.count(RepoStatus::Analyzed)
    }

    /// Number of repositories that ended `failed`.
    pub fn failed(&self) -> usize {
        self.count(RepoStatus::Failed)
    }

    fn count(&self, status: RepoStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Returns true if any repository failed without output corroboration.
    pub fn has_uncorroborated_failure(&self) -> bool {
        self.outcomes.iter().any(RepoOutcome::is_uncorroborated_failure)
    }

    /// Process exit status for the batch.
    pub fn exit_code(&self) -> i32 {
        if self.has_uncorroborated_failure() {
            1
        } else {
            0
        }
    }
}

/// What the tool invocation reported, before evaluation.
struct ProcessReport {
    errored: bool,
    detail: String,
}

impl ProcessReport {
    fn from_invocation(invocation: &Result<ToolExit, ToolInvocationError>) -> Self {
        match invocation {
            Ok(exit) if exit.is_success() => Self {
                errored: false,
                detail: "exit code 0".to_string(),
            },
            Ok(exit) => Self {
                errored: true,
                detail: match exit.code {
                    Some(code) => format!("exit code {}", code),
                    None => "terminated by signal".to_string(),
                },
            },
            Err(e) => Self {
                errored: true,
                detail: e.to_string(),
            },
        }
    }
}

/// Sequential batch runner over the status ledger.
pub struct Orchestrator {
    registry: AnalysisRegistry,
    acquirer: Box<dyn RepoAcquirer>,
    tool: Box<dyn AnalysisTool>,
    evaluator: SuccessEvaluator,
    collector: ArtifactCollector,
    paths: PathsConfig,
    force: bool,
}

impl Orchestrator {
    /// Creates an orchestrator over an already loaded ledger.
    ///
    /// `paths` must already be resolved against the project root.
    pub fn new(
        registry: AnalysisRegistry,
        acquirer: Box<dyn RepoAcquirer>,
        tool: Box<dyn AnalysisTool>,
        paths: PathsConfig,
    ) -> Self {
        Self {
            registry,
            acquirer,
            tool,
            evaluator: SuccessEvaluator::new(),
            collector: ArtifactCollector::default(),
            paths,
            force: false,
        }
    }

    /// Builds the production orchestrator for `config`.
    ///
    /// Loads the ledger, so a corrupt ledger stops the run here before any
    /// repository is touched.
    pub fn from_config(config: &AnalyzerConfig, root: &Path) -> Result<Self, LedgerError> {
        let paths = config.paths.resolve(root);
        let registry = AnalysisRegistry::load(&paths.ledger_file)?;
        let tool = ExternalTool::new(&config.tool.command, &config.tool.transformation)
            .with_subcommand(config.tool.subcommand.clone())
            .with_timeout(config.tool.timeout());

        Ok(Self::new(
            registry,
            Box::new(GitAcquirer::new()),
            Box::new(tool),
            paths,
        ))
    }

    /// Builder method to re-analyze repositories already at `analyzed`.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Builder method to replace the artifact collector.
    pub fn with_collector(mut self, collector: ArtifactCollector) -> Self {
        self.collector = collector;
        self
    }

    /// The ledger as currently held in memory.
    pub fn registry(&self) -> &AnalysisRegistry {
        &self.registry
    }

    /// Process `repos` in order.
    ///
    /// Only ledger persistence failures abort the batch; everything local to
    /// one repository ends up in that repository's ledger entry.
    pub async fn run(&mut self, repos: &[RepositoryRef]) -> Result<BatchSummary, LedgerError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch", %run_id);
        self.run_batch(repos, run_id).instrument(span).await
    }

    async fn run_batch(
        &mut self,
        repos: &[RepositoryRef],
        run_id: Uuid,
    ) -> Result<BatchSummary, LedgerError> {
        let mut summary = BatchSummary::new(run_id);

        let already_analyzed = if self.force {
            Default::default()
        } else {
            self.registry.find_by_status(RepoStatus::Analyzed)
        };

        let (turns, skipped): (Vec<&RepositoryRef>, Vec<&RepositoryRef>) = repos
            .iter()
            .partition(|repo| !already_analyzed.contains(&repo.name));

        for repo in &skipped {
            info!(repo = %repo.name, "Skipping: already analyzed");
            summary.skipped.push(repo.name.clone());
        }

        if turns.is_empty() {
            info!("No repositories to analyze");
            return Ok(summary);
        }

        for repo in &turns {
            self.registry
                .upsert(&repo.name, &repo.source_location, RepoStatus::Pending, None, None);
        }
        self.registry.save()?;
        info!(
            count = turns.len(),
            skipped = summary.skipped.len(),
            force = self.force,
            "Starting batch"
        );

        for repo in turns {
            let span = info_span!("repo", repo = %repo.name);
            let outcome = self.run_turn(repo).instrument(span).await?;
            summary.outcomes.push(outcome);
        }

        info!(
            analyzed = summary.analyzed(),
            failed = summary.failed(),
            skipped = summary.skipped.len(),
            "Batch finished"
        );
        Ok(summary)
    }

    /// One repository's acquire, invoke, evaluate, finalize and cleanup cycle.
    async fn run_turn(&mut self, repo: &RepositoryRef) -> Result<RepoOutcome, LedgerError> {
        info!("Processing {} ({})", repo.name, repo.source_location);

        let working_copy = match WorkingCopy::prepare(self.paths.working_copy(&repo.name)) {
            Ok(copy) => copy,
            Err(e) => return self.record_acquisition_failure(repo, &e),
        };

        let outcome = self.analyze(repo, &working_copy).await;

        if let Err(warning) = working_copy.release() {
            warn!("{}", warning);
        }

        outcome
    }

    async fn analyze(
        &mut self,
        repo: &RepositoryRef,
        working_copy: &WorkingCopy,
    ) -> Result<RepoOutcome, LedgerError> {
        if let Err(e) = self.acquirer.acquire(repo, working_copy.path()).await {
            return self.record_acquisition_failure(repo, &e);
        }

        self.transition(repo, RepoStatus::Running, None)?;

        let log_path = self.paths.log_file(&repo.name);
        let artifact_dir = self.paths.artifact_dir(&repo.name);
        if let Err(e) = fs::create_dir_all(&artifact_dir) {
            warn!("Failed to create {}: {}", artifact_dir.display(), e);
        }

        // A previous attempt's log must never be read as this attempt's.
        if let Err(e) = fs::remove_file(&log_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove previous log {}: {}", log_path.display(), e);
            }
        }

        let invocation = self.tool.run(working_copy.path(), &log_path).await;
        if let Err(e) = &invocation {
            warn!("Tool invocation error: {}", e);
        }
        let process = ProcessReport::from_invocation(&invocation);

        let evaluation = match &invocation {
            Err(ToolInvocationError::LogFile { .. }) => {
                self.evaluator.evaluate_outputs(working_copy.path())
            }
            _ => self.evaluator.evaluate(working_copy.path(), &log_path),
        };
        let artifacts_copied = self.collector.collect(working_copy.path(), &artifact_dir);

        let (status, notes) = decide(&evaluation, &process, &log_path);
        self.transition(repo, status, Some(notes.clone()))?;

        match status {
            RepoStatus::Analyzed => info!(
                confidence = %evaluation.confidence,
                artifacts = artifacts_copied,
                "Analysis recorded as analyzed"
            ),
            _ => warn!(
                confidence = %evaluation.confidence,
                "Analysis failed. Check {}",
                log_path.display()
            ),
        }

        Ok(RepoOutcome {
            repo_name: repo.name.clone(),
            status,
            confidence: Some(evaluation.confidence),
            acquired: true,
            process_errored: process.errored,
            artifacts_copied,
            notes,
        })
    }

    fn record_acquisition_failure(
        &mut self,
        repo: &RepositoryRef,
        error: &AcquisitionError,
    ) -> Result<RepoOutcome, LedgerError> {
        warn!("Acquisition failed: {}", error);
        let notes = format!("Acquisition failed: {}", error);
        self.transition(repo, RepoStatus::Failed, Some(notes.clone()))?;

        Ok(RepoOutcome {
            repo_name: repo.name.clone(),
            status: RepoStatus::Failed,
            confidence: None,
            acquired: false,
            process_errored: false,
            artifacts_copied: 0,
            notes,
        })
    }

    /// Upsert and persist in one step.
    fn transition(
        &mut self,
        repo: &RepositoryRef,
        status: RepoStatus,
        notes: Option<String>,
    ) -> Result<(), LedgerError> {
        self.registry
            .upsert(&repo.name, &repo.source_location, status, None, notes);
        self.registry.save()
    }
}

/// Terminal status and ledger notes for an evaluated attempt.
fn decide(
    evaluation: &EvaluationResult,
    process: &ProcessReport,
    log_path: &Path,
) -> (RepoStatus, String) {
    let found = EvaluationResult::describe(&evaluation.outputs_found);

    if evaluation.is_success {
        let mut notes = format!(
            "Analysis succeeded ({} confidence); outputs found: {}",
            evaluation.confidence, found
        );
        if evaluation.log_validation_approved {
            notes.push_str("; log reports validation approved");
        }
        if process.errored {
            notes.push_str(&format!(
                "; process reported failure ({}) but outputs indicate success",
                process.detail
            ));
        }
        return (RepoStatus::Analyzed, notes);
    }

    if !process.errored {
        return (
            RepoStatus::Analyzed,
            format!(
                "Limited outputs: process exited cleanly but outputs found: {}",
                found
            ),
        );
    }

    (
        RepoStatus::Failed,
        format!(
            "Analysis failed ({}); missing outputs: {}; see log {}",
            process.detail,
            EvaluationResult::describe(&evaluation.outputs_missing),
            log_path.display()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::OutputMarker;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn evaluation(found: &[OutputMarker], log_success: bool) -> EvaluationResult {
        let outputs_found: BTreeSet<_> = found.iter().copied().collect();
        let outputs_missing = OutputMarker::ALL
            .into_iter()
            .filter(|m| !outputs_found.contains(m))
            .collect();
        let artifacts =
            outputs_found.len() >= 2 && outputs_found.contains(&OutputMarker::Documentation);
        EvaluationResult {
            is_success: log_success || artifacts,
            confidence: match (log_success, outputs_found.len() >= 2) {
                (true, true) => Confidence::High,
                (true, false) => Confidence::Medium,
                _ if artifacts => Confidence::Medium,
                _ => Confidence::Low,
            },
            outputs_found,
            outputs_missing,
            log_declares_success: log_success,
            log_validation_approved: false,
        }
    }

    fn report(invocation: Result<ToolExit, ToolInvocationError>) -> ProcessReport {
        ProcessReport::from_invocation(&invocation)
    }

    #[test]
    fn test_success_despite_process_error_is_noted() {
        let eval = evaluation(&[OutputMarker::Documentation, OutputMarker::Aws], true);
        let process = report(Ok(ToolExit::new(Some(2), Duration::ZERO)));
        let (status, notes) = decide(&eval, &process, Path::new("repos/svc_transform.log"));

        assert_eq!(status, RepoStatus::Analyzed);
        assert!(notes.contains("high confidence"));
        assert!(notes.contains("Documentation, .aws"));
        assert!(notes.contains("exit code 2"));
    }

    #[test]
    fn test_clean_exit_with_thin_output_is_limited() {
        let eval = evaluation(&[OutputMarker::Atx], false);
        let process = report(Ok(ToolExit::new(Some(0), Duration::ZERO)));
        let (status, notes) = decide(&eval, &process, Path::new("x.log"));

        assert_eq!(status, RepoStatus::Analyzed);
        assert!(notes.starts_with("Limited outputs"));
    }

    #[test]
    fn test_errored_without_evidence_fails() {
        let eval = evaluation(&[], false);
        let process = report(Err(ToolInvocationError::Timeout(Duration::from_secs(5))));
        let (status, notes) = decide(&eval, &process, Path::new("repos/svc_transform.log"));

        assert_eq!(status, RepoStatus::Failed);
        assert!(notes.contains("missing outputs: Documentation"));
        assert!(notes.contains("repos/svc_transform.log"));
    }

    #[test]
    fn test_signal_termination_counts_as_error() {
        let process = report(Ok(ToolExit::new(None, Duration::ZERO)));
        assert!(process.errored);
        assert_eq!(process.detail, "terminated by signal");
    }

    #[test]
    fn test_batch_exit_code() {
        let mut summary = BatchSummary::new(Uuid::new_v4());
        assert_eq!(summary.exit_code(), 0);

        summary.outcomes.push(RepoOutcome {
            repo_name: "ok".to_string(),
            status: RepoStatus::Analyzed,
            confidence: Some(Confidence::Medium),
            acquired: true,
            process_errored: true,
            artifacts_copied: 2,
            notes: String::new(),
        });
        assert_eq!(summary.exit_code(), 0);

        summary.outcomes.push(RepoOutcome {
            repo_name: "gone".to_string(),
            status: RepoStatus::Failed,
            confidence: None,
            acquired: false,
            process_errored: false,
            artifacts_copied: 0,
            notes: String::new(),
        });
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.analyzed(), 1);
        assert_eq!(summary.failed(), 1);
    }
}
