//! Post-Execution Analysis
//!
//! Runs the quality, statistics, validation and decision stages over a sample
//! set and assembles the final report. Used both after a live run and by
//! `versus analyze` on saved samples.

use tracing::debug;
use versus_core::{ExecutionReport, PipelineConfig, Sample, VariantPair};
use versus_logic::{CrossVariantValidator, DecisionEngine, ReferenceOracle};
use versus_report::{PipelineReport, ReportMeta, assemble_report};
use versus_stats::{QualityController, StatisticalAnalyzer};

/// Analyze `samples` and build the report
pub fn analyze_samples(
    config: &PipelineConfig,
    variants: &VariantPair,
    samples: Vec<Sample>,
    execution: Option<&ExecutionReport>,
    meta: ReportMeta,
) -> PipelineReport {
    let quality = QualityController::new(config.quality.clone()).clean(&samples);

    let analysis = StatisticalAnalyzer::new(config.statistics).analyze(&quality, variants);

    let trusted = config
        .validation
        .trusted_variant
        .clone()
        .unwrap_or_else(|| variants.a.clone());
    let oracle = ReferenceOracle::from_samples(&samples, &trusted);
    debug!(trusted = %trusted, references = oracle.len(), "reference oracle built");
    let validations =
        CrossVariantValidator::new(&config.validation).validate_samples(&samples, variants, &oracle);

    let decision = DecisionEngine::new(config.decision.clone(), &config.statistics).decide(
        &analysis.comparisons,
        &validations,
        variants,
        &samples,
    );

    assemble_report(
        meta,
        variants.clone(),
        execution,
        samples,
        &quality,
        analysis,
        validations,
        decision,
    )
}
