#![warn(missing_docs)]
//! Versus Report - Reporting
//!
//! Collects every stage's output into one serializable [`PipelineReport`]
//! and renders it:
//! - JSON (machine-readable, reloadable)
//! - Markdown (pull request comments, job summaries)
//!
//! The human-readable terminal format lives in the CLI.

mod json;
mod markdown;
mod report;

pub use json::{
    ReportError, SampleSet, generate_json_report, load_json_report, load_samples,
    save_json_report, save_samples,
};
pub use markdown::generate_markdown_report;
pub use report::{
    DataLedger, DiscardedSample, ExcludedData, ExclusionStage, ExecutionSummary, PipelineReport,
    QualitySummary, ReportMeta, SCHEMA_VERSION, SystemInfo, UsedData, assemble_report,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// JSON with full schema
    Json,
    /// Markdown summary
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
