//! Report Data Structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use versus_core::{
    Cell, CellOutcome, CellStatus, CleanupDiagnostic, ExecutionReport, FatalAbort,
    PipelineConfig, RunState, Sample, Scale, VariantPair,
};
use versus_logic::{DecisionReport, ValidationOutcome};
use versus_stats::{
    AnalysisExclusion, AnalysisReport, ComparisonResult, DatasetVerdict, QualityAssessment,
    QualityLevel, QualityReport,
};

/// Current report schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Complete pipeline report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub meta: ReportMeta,
    pub variants: VariantPair,
    /// Absent when samples were re-analyzed from a file
    pub execution: Option<ExecutionSummary>,
    pub samples: Vec<Sample>,
    pub quality: QualitySummary,
    pub comparisons: Vec<ComparisonResult>,
    pub validations: Vec<ValidationOutcome>,
    pub decision: DecisionReport,
    pub ledger: DataLedger,
}

impl PipelineReport {
    /// Whether the run finished and produced a usable dataset
    pub fn is_successful(&self) -> bool {
        let aborted = self
            .execution
            .as_ref()
            .is_some_and(|e| e.state == RunState::Aborted);
        !aborted && self.quality.dataset.level != QualityLevel::Invalid
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub schema_version: u32,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub system: SystemInfo,
    /// Settings the pipeline ran with
    pub config: PipelineConfig,
}

/// System information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpu: String,
    pub cpu_cores: u32,
    pub memory_gb: f64,
}

/// What the orchestrator did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub state: RunState,
    pub abort: Option<FatalAbort>,
    pub cell_outcomes: Vec<CellOutcome>,
    pub diagnostics: Vec<CleanupDiagnostic>,
    pub total_samples: usize,
    pub failed_samples: usize,
    pub skipped_cells: usize,
    pub duration_ms: f64,
}

impl From<&ExecutionReport> for ExecutionSummary {
    fn from(report: &ExecutionReport) -> Self {
        Self {
            state: report.state,
            abort: report.abort.clone(),
            cell_outcomes: report.cell_outcomes.clone(),
            diagnostics: report.diagnostics.clone(),
            total_samples: report.samples.len(),
            failed_samples: report.failed_samples(),
            skipped_cells: report
                .cell_outcomes
                .iter()
                .filter(|o| o.status == CellStatus::Skipped)
                .count(),
            duration_ms: report.elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Quality verdicts without the per-sample payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySummary {
    pub assessments: Vec<QualityAssessment>,
    pub dataset: DatasetVerdict,
    pub outliers_removed: usize,
}

impl From<&QualityReport> for QualitySummary {
    fn from(report: &QualityReport) -> Self {
        Self {
            assessments: report.assessments.clone(),
            dataset: report.dataset.clone(),
            outliers_removed: report.total_outliers(),
        }
    }
}

/// Samples of one cell that fed the comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsedData {
    pub cell: Cell,
    pub samples: usize,
}

/// A sample dropped during quality control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardedSample {
    pub cell: Cell,
    pub trial: u32,
    pub reason: String,
}

/// Pipeline stage that excluded data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionStage {
    /// Left out of the statistical comparison
    Analysis,
    /// Left out of the decision by digest validation
    Validation,
}

/// A task (or task/scale pair) left out of the results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedData {
    pub task: String,
    /// Absent when the whole task was excluded
    pub scale: Option<Scale>,
    pub stage: ExclusionStage,
    pub reason: String,
}

/// Data used, data discarded and why, data excluded and why
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataLedger {
    pub used: Vec<UsedData>,
    pub discarded: Vec<DiscardedSample>,
    pub excluded: Vec<ExcludedData>,
}

impl DataLedger {
    /// Build the ledger from the stage outputs
    pub fn build(
        quality: &QualityReport,
        analysis_exclusions: &[AnalysisExclusion],
        decision: &DecisionReport,
    ) -> Self {
        let excluded_pair = |cell: &Cell| {
            analysis_exclusions
                .iter()
                .any(|e| e.task == cell.task && e.scale == cell.scale)
                || decision.is_excluded(&cell.task)
        };

        let used = quality
            .groups
            .iter()
            .filter(|g| !excluded_pair(&g.cell))
            .map(|g| UsedData {
                cell: g.cell.clone(),
                samples: g.retained.len(),
            })
            .collect();

        let discarded = quality
            .groups
            .iter()
            .flat_map(|g| {
                g.removed.iter().map(|r| DiscardedSample {
                    cell: g.cell.clone(),
                    trial: r.sample.trial,
                    reason: r.reason.to_string(),
                })
            })
            .collect();

        let excluded = analysis_exclusions
            .iter()
            .map(|e| ExcludedData {
                task: e.task.clone(),
                scale: Some(e.scale),
                stage: ExclusionStage::Analysis,
                reason: e.reason.to_string(),
            })
            .chain(decision.excluded.iter().map(|e| ExcludedData {
                task: e.task.clone(),
                scale: None,
                stage: ExclusionStage::Validation,
                reason: e.reasons.join("; "),
            }))
            .collect();

        Self {
            used,
            discarded,
            excluded,
        }
    }
}

/// Assemble the report from every stage's output
#[allow(clippy::too_many_arguments)]
pub fn assemble_report(
    meta: ReportMeta,
    variants: VariantPair,
    execution: Option<&ExecutionReport>,
    samples: Vec<Sample>,
    quality: &QualityReport,
    analysis: AnalysisReport,
    validations: Vec<ValidationOutcome>,
    decision: DecisionReport,
) -> PipelineReport {
    let ledger = DataLedger::build(quality, &analysis.exclusions, &decision);
    PipelineReport {
        meta,
        variants,
        execution: execution.map(ExecutionSummary::from),
        samples,
        quality: QualitySummary::from(quality),
        comparisons: analysis.comparisons,
        validations,
        decision,
        ledger,
    }
}
