//! Invocation of the external analysis tool.
//!
//! The tool runs for hours and prints without bound, so its stdout and stderr
//! go straight into one log file instead of through process memory.

use std::fs::File;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ToolInvocationError;

/// Exit information of a finished tool process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
}

impl ToolExit {
    /// Creates an exit record.
    pub fn new(code: Option<i32>, duration: Duration) -> Self {
        Self { code, duration }
    }

    fn from_status(status: ExitStatus, duration: Duration) -> Self {
        Self::new(status.code(), duration)
    }

    /// Checks if the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an analysis against a working copy.
#[async_trait]
pub trait AnalysisTool: Send + Sync {
    /// Analyze `working_dir`, writing all tool output to `log_path`.
    async fn run(
        &self,
        working_dir: &Path,
        log_path: &Path,
    ) -> Result<ToolExit, ToolInvocationError>;
}

/// The transform CLI, run in non-interactive, trust-all-tools mode.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    /// Executable to run.
    program: String,
    /// Arguments placed before the transformation flags.
    subcommand: Vec<String>,
    /// Named transformation to execute.
    transformation: String,
    /// Optional wall-clock ceiling.
    timeout: Option<Duration>,
}

impl ExternalTool {
    /// Creates a tool invocation for `program` running `transformation`.
    pub fn new(program: impl Into<String>, transformation: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subcommand: Vec::new(),
            transformation: transformation.into(),
            timeout: None,
        }
    }

    /// Sets the leading subcommand words.
    pub fn with_subcommand(mut self, words: Vec<String>) -> Self {
        self.subcommand = words;
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument list for one invocation.
    pub fn command_args(&self, working_dir: &Path) -> Vec<String> {
        let mut args = self.subcommand.clone();
        args.extend([
            "-n".to_string(),
            self.transformation.clone(),
            "-p".to_string(),
            working_dir.to_string_lossy().to_string(),
            // Non-interactive mode
            "-x".to_string(),
            // Trust all tools
            "-t".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl AnalysisTool for ExternalTool {
    async fn run(
        &self,
        working_dir: &Path,
        log_path: &Path,
    ) -> Result<ToolExit, ToolInvocationError> {
        let log_error = |source| ToolInvocationError::LogFile {
            path: log_path.to_path_buf(),
            source,
        };

        // The child's cwd is the working copy; a relative -p would resolve
        // against itself.
        let working_dir =
            std::path::absolute(working_dir).map_err(|source| ToolInvocationError::Spawn {
                command: self.program.clone(),
                source,
            })?;
        let working_dir = working_dir.as_path();

        let log_file = File::create(log_path).map_err(log_error)?;
        let stderr_file = log_file.try_clone().map_err(log_error)?;

        info!("Running transformation {} on {}", self.transformation, working_dir.display());
        info!("Streaming output to {}", log_path.display());

        let args = self.command_args(working_dir);
        debug!("Command: {} {}", self.program, args.join(" "));

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_file))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolInvocationError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => result.map_err(ToolInvocationError::Wait)?,
                Err(_) => {
                    warn!("Transformation exceeded {:?}; killing process", limit);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill tool process: {}", e);
                    }
                    return Err(ToolInvocationError::Timeout(limit));
                }
            },
            None => child.wait().await.map_err(ToolInvocationError::Wait)?,
        };

        let exit = ToolExit::from_status(status, start.elapsed());
        info!(
            code = ?exit.code,
            duration = ?exit.duration,
            "Transform analysis finished. Logs saved to {}",
            log_path.display()
        );

        Ok(exit)
    }
}
