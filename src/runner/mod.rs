//! Per-repository turn machinery.
//!
//! ```text
//! WorkingCopy::prepare -> RepoAcquirer -> AnalysisTool -> SuccessEvaluator
//!                                                      -> ArtifactCollector
//! ```
//!
//! The acquirer and the tool are traits so the orchestrator can run against
//! fakes; everything else is plain filesystem work.

pub mod acquire;
pub mod collector;
pub mod evaluator;
pub mod tool;
pub mod workspace;

pub use acquire::{GitAcquirer, RepoAcquirer};
pub use collector::ArtifactCollector;
pub use evaluator::{Confidence, EvaluationResult, OutputMarker, SuccessEvaluator};
pub use tool::{AnalysisTool, ExternalTool, ToolExit};
pub use workspace::{force_remove, WorkingCopy};
