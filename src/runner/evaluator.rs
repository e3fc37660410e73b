//! Output-based success evaluation for analysis attempts.
//!
//! The transform tool's exit code is unreliable: it may exit non-zero after
//! completing useful work, or exit zero having produced nothing. The
//! evaluator therefore inspects observable effects: which output markers exist
//! in the working copy and whether the log declares success.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Success phrases, strongest first.
pub const SUCCESS_PHRASES: &[&str] = &[
    "successfully completed with all exit criteria met",
    "all exit criteria met",
];

/// Name prefix reserved for the tool's primary output.
pub const PRIMARY_OUTPUT_PREFIX: &str = ".aws";

/// Recognized output markers left behind by the transform tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutputMarker {
    /// Generated documentation bundle.
    Documentation,
    /// Primary tool output directory.
    Aws,
    /// Tool-internal state directory.
    Atx,
    /// Transformation output directory.
    TransformOutput,
    /// Analysis output directory.
    AnalysisOutput,
}

impl OutputMarker {
    /// All markers, in evaluation order.
    pub const ALL: [OutputMarker; 5] = [
        OutputMarker::Documentation,
        OutputMarker::Aws,
        OutputMarker::Atx,
        OutputMarker::TransformOutput,
        OutputMarker::AnalysisOutput,
    ];

    /// Directory name the marker appears under in a working copy.
    pub fn dir_name(&self) -> &'static str {
        match self {
            OutputMarker::Documentation => "Documentation",
            OutputMarker::Aws => ".aws",
            OutputMarker::Atx => ".atx",
            OutputMarker::TransformOutput => "transform_output",
            OutputMarker::AnalysisOutput => "analysis_output",
        }
    }

    /// Look up a marker by its directory name.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.dir_name() == name)
    }
}

impl std::fmt::Display for OutputMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// How much the evidence agrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Outcome of evaluating one analysis attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Whether the attempt is considered successful.
    pub is_success: bool,
    /// Agreement between log and artifact evidence.
    pub confidence: Confidence,
    /// Markers present in the working copy.
    pub outputs_found: BTreeSet<OutputMarker>,
    /// Markers absent from the working copy.
    pub outputs_missing: BTreeSet<OutputMarker>,
    /// Whether the log contains a success phrase.
    pub log_declares_success: bool,
    /// Whether the log mentions both a validation status and an approval.
    pub log_validation_approved: bool,
}

impl EvaluationResult {
    /// Returns true when the documentation bundle was produced.
    pub fn has_documentation(&self) -> bool {
        self.outputs_found.contains(&OutputMarker::Documentation)
    }

    /// Comma-separated marker names, or "none".
    pub fn describe(markers: &BTreeSet<OutputMarker>) -> String {
        if markers.is_empty() {
            return "none".to_string();
        }
        markers
            .iter()
            .map(|m| m.dir_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What a log file says about the run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LogSignals {
    declares_success: bool,
    validation_approved: bool,
}

/// Classifies analysis attempts from their working copy and log.
pub struct SuccessEvaluator {
    success_phrases: RegexSet,
    validation_status: Regex,
    approved: Regex,
}

impl Default for SuccessEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl SuccessEvaluator {
    /// Creates an evaluator with the built-in success phrases.
    pub fn new() -> Self {
        let patterns: Vec<String> = SUCCESS_PHRASES
            .iter()
            .map(|p| format!("(?i){}", regex::escape(p)))
            .collect();

        Self {
            success_phrases: RegexSet::new(&patterns).expect("escaped phrases are valid regex"),
            validation_status: Regex::new(r"(?i)validation status").expect("static regex"),
            approved: Regex::new(r"(?i)approved").expect("static regex"),
        }
    }

    /// Evaluate the attempt that ran in `working_dir` and logged to `log_path`.
    ///
    /// Never fails: unreadable inputs count as absent evidence.
    pub fn evaluate(&self, working_dir: &Path, log_path: &Path) -> EvaluationResult {
        self.classify(working_dir, self.scan_log(log_path))
    }

    /// Evaluate from the working copy alone, for attempts whose log was not
    /// written this time.
    pub fn evaluate_outputs(&self, working_dir: &Path) -> EvaluationResult {
        self.classify(working_dir, LogSignals::default())
    }

    fn classify(&self, working_dir: &Path, signals: LogSignals) -> EvaluationResult {
        let mut outputs_found = BTreeSet::new();
        let mut outputs_missing = BTreeSet::new();

        for marker in OutputMarker::ALL {
            if working_dir.join(marker.dir_name()).exists() {
                outputs_found.insert(marker);
            } else {
                outputs_missing.insert(marker);
            }
        }

        let enough_outputs = outputs_found.len() >= 2;
        let has_documentation = outputs_found.contains(&OutputMarker::Documentation);
        let artifacts_convincing = enough_outputs && has_documentation;

        let is_success = signals.declares_success || artifacts_convincing;

        let confidence = if signals.declares_success && enough_outputs {
            Confidence::High
        } else if signals.declares_success || artifacts_convincing {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        debug!(
            found = outputs_found.len(),
            log_success = signals.declares_success,
            %confidence,
            "Evaluated analysis outputs"
        );

        EvaluationResult {
            is_success,
            confidence,
            outputs_found,
            outputs_missing,
            log_declares_success: signals.declares_success,
            log_validation_approved: signals.validation_approved,
        }
    }

    /// Scans the log line by line so arbitrarily large logs stay out of memory.
    fn scan_log(&self, log_path: &Path) -> LogSignals {
        let mut signals = LogSignals::default();

        let file = match File::open(log_path) {
            Ok(f) => f,
            Err(_) => return signals,
        };

        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut saw_validation = false;
        let mut saw_approved = false;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %log_path.display(), error = %e, "Stopped reading log early");
                    break;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            if !signals.declares_success && self.success_phrases.is_match(&line) {
                signals.declares_success = true;
            }
            saw_validation |= self.validation_status.is_match(&line);
            saw_approved |= self.approved.is_match(&line);
        }

        signals.validation_approved = saw_validation && saw_approved;
        signals
    }
}
