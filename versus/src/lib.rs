#![warn(missing_docs)]
//! # Versus
//!
//! Head-to-head benchmarking of two implementations with a statistical verdict.
//!
//! Versus runs the same tasks against two variants and decides, with a stated
//! confidence, which one to prefer:
//! - **Orchestration**: bounded concurrency over a pool of runner contexts, layered timeouts, retries with backoff, failure-threshold abort
//! - **Quality Control**: IQR outlier removal and coefficient-of-variation stability checks per cell
//! - **Statistics**: Welch's t-test, Cohen's d with magnitude classes, achievable minimum detectable effect
//! - **Validation**: FNV-1a result digests compared against a reference oracle, with an auditable allow-list
//! - **Decision**: tiered per-task recommendations and a weighted overall verdict
//!
//! ## Quick Start
//!
//! ```ignore
//! use versus::prelude::*;
//!
//! let config = PipelineConfig::default();
//! let variants = VariantPair::new("rust", "go");
//! let quality = QualityController::new(config.quality.clone()).clean(&samples);
//! let analysis = StatisticalAnalyzer::new(config.statistics).analyze(&quality, &variants);
//! ```
//!
//! ## Custom Runners
//!
//! ```ignore
//! struct InProcess;
//!
//! impl Runner for InProcess {
//!     fn execute<'a>(&'a self, request: &'a TrialRequest)
//!         -> BoxFuture<'a, Result<TrialOutcome, RunnerError>> {
//!         Box::pin(async move { Ok(TrialOutcome::measured(1.0, 0, None)) })
//!     }
//! }
//! ```

// Re-export core types
pub use versus_core::{
    BenchmarkPlan, CancellationToken, Cell, CellOutcome, CellStatus, ExecutionObserver,
    ExecutionReport, FailureReason, FatalAbort, Metric, Orchestrator, OrchestratorConfig,
    OrchestratorError, PipelineConfig, RetryPolicy, RunState, Runner, RunnerError, RunnerPool,
    Sample, Scale, SchedulingMode, TaskSpec, TimeoutPolicy, TrialOutcome, TrialRequest,
    ValidationError, VariantId, VariantPair, Workload,
};

// Re-export stats
pub use versus_stats::{
    AnalysisReport, Comparison, ComparisonResult, ComparisonStatus, EffectMagnitude,
    QualityController, QualityLevel, QualityReport, StatisticalAnalyzer, compare,
};

// Re-export logic types
pub use versus_logic::{
    ConfidenceTier, CrossVariantValidator, DecisionEngine, DecisionReport, ReferenceOracle,
    ValidationOutcome, ValidationStatus, digest_f32s, fnv1a_32,
};

// Re-export reporting
pub use versus_report::{
    OutputFormat, PipelineReport, generate_json_report, generate_markdown_report,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchmarkPlan, Cell, CrossVariantValidator, DecisionEngine, Metric, Orchestrator,
        PipelineConfig, QualityController, ReferenceOracle, Runner, RunnerError, RunnerPool,
        Sample, Scale, StatisticalAnalyzer, TaskSpec, TrialOutcome, TrialRequest, VariantPair,
    };
    pub use futures::future::BoxFuture;
}

/// Run the Versus command line.
///
/// ```ignore
/// fn main() {
///     versus::run().unwrap();
/// }
/// ```
pub use versus_cli::{analyze_samples, run};
