#![warn(missing_docs)]
//! Versus Statistical Engine
//!
//! Everything between raw samples and per-metric verdicts:
//! - IQR outlier fences over linearly interpolated quartiles
//! - Per-group stability (coefficient of variation) and quality levels
//! - Welch's t-test with Welch–Satterthwaite degrees of freedom
//! - Cohen's d with configurable magnitude thresholds and an MDE check
//!
//! ## Pipeline
//!
//! ```text
//! Vec<Sample> ──► QualityController ──► QualityReport
//!                                           │
//!                                           ▼
//!                              StatisticalAnalyzer (rayon)
//!                                           │
//!                                           ▼
//!                                    AnalysisReport
//! ```

mod analysis;
mod comparison;
mod distribution;
mod outliers;
mod percentiles;
mod quality;
mod summary;

pub use analysis::{AnalysisExclusion, AnalysisReport, ExclusionReason, StatisticalAnalyzer};
pub use comparison::{
    Comparison, ComparisonResult, ComparisonStatus, ConfidenceInterval, EffectMagnitude,
    EffectSize, PowerCheck, WelchTest, compare,
};
pub use distribution::{
    ln_gamma, normal_cdf, normal_quantile, regularized_incomplete_beta, student_t_cdf,
    student_t_quantile, student_t_two_tailed_p,
};
pub use outliers::{BoundSide, OutlierBounds};
pub use percentiles::{Percentiles, compute_percentile, compute_percentiles, quartiles};
pub use quality::{
    CleanedGroup, DatasetVerdict, MetricStability, QualityAssessment, QualityController,
    QualityLevel, QualityReport, RemovalReason, RemovedSample,
};
pub use summary::{
    SummaryStatistics, coefficient_of_variation, compute_summary, mean, sample_variance,
};
