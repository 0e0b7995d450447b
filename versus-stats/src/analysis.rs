//! Statistical Analyzer
//!
//! Pairs the cleaned groups of both variants per (task, scale) and compares
//! every metric. Pairs with a missing or invalid side are listed as
//! exclusions instead of being compared.

use crate::comparison::{ComparisonResult, compare};
use crate::quality::{QualityLevel, QualityReport};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};
use versus_core::{Cell, Metric, Scale, StatisticsConfig, VariantId, VariantPair};

/// Why a (task, scale) pair was not compared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// A variant has no samples for the pair
    MissingGroup {
        /// Variant without data
        variant: VariantId,
    },
    /// A variant's group failed quality control
    InvalidGroup {
        /// Variant whose group is invalid
        variant: VariantId,
        /// Quality reasons
        reasons: Vec<String>,
    },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::MissingGroup { variant } => write!(f, "no samples for {}", variant),
            ExclusionReason::InvalidGroup { variant, reasons } => {
                write!(f, "{} group invalid: {}", variant, reasons.join("; "))
            }
        }
    }
}

/// A (task, scale) pair left out of the comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisExclusion {
    /// Task name
    pub task: String,
    /// Scale
    pub scale: Scale,
    /// Why it was left out
    pub reason: ExclusionReason,
}

/// Output of [`StatisticalAnalyzer::analyze`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// One entry per (task, scale, metric), in that order
    pub comparisons: Vec<ComparisonResult>,
    /// Pairs that were not compared
    pub exclusions: Vec<AnalysisExclusion>,
}

/// Compares the two variants' cleaned groups
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalAnalyzer {
    config: StatisticsConfig,
}

impl StatisticalAnalyzer {
    /// Analyzer using `config`
    pub fn new(config: StatisticsConfig) -> Self {
        Self { config }
    }

    /// Compare every (task, scale, metric) present in `quality`
    pub fn analyze(&self, quality: &QualityReport, variants: &VariantPair) -> AnalysisReport {
        let pairs: BTreeSet<(&str, Scale)> = quality
            .groups
            .iter()
            .filter(|g| variants.contains(&g.cell.variant))
            .map(|g| (g.cell.task.as_str(), g.cell.scale))
            .collect();

        let mut exclusions = Vec::new();
        let mut jobs = Vec::new();
        for (task, scale) in pairs {
            let cell_a = Cell::new(task, variants.a.clone(), scale);
            let cell_b = Cell::new(task, variants.b.clone(), scale);
            match self.excluded(quality, &cell_a).or_else(|| self.excluded(quality, &cell_b)) {
                Some(reason) => {
                    debug!(task, %scale, %reason, "pair excluded from comparison");
                    exclusions.push(AnalysisExclusion {
                        task: task.to_string(),
                        scale,
                        reason,
                    });
                }
                None => {
                    if let (Some(a), Some(b)) = (quality.group(&cell_a), quality.group(&cell_b)) {
                        for metric in Metric::ALL {
                            jobs.push((task, scale, metric, a, b));
                        }
                    }
                }
            }
        }

        let config = self.config;
        let comparisons: Vec<ComparisonResult> = jobs
            .par_iter()
            .map(|&(task, scale, metric, a, b)| ComparisonResult {
                task: task.to_string(),
                scale,
                metric,
                variants: variants.clone(),
                comparison: compare(&a.values(metric), &b.values(metric), &config),
            })
            .collect();

        info!(
            comparisons = comparisons.len(),
            excluded = exclusions.len(),
            "statistical analysis finished"
        );
        AnalysisReport {
            comparisons,
            exclusions,
        }
    }

    fn excluded(&self, quality: &QualityReport, cell: &Cell) -> Option<ExclusionReason> {
        match quality.assessment(cell) {
            None => Some(ExclusionReason::MissingGroup {
                variant: cell.variant.clone(),
            }),
            Some(a) if a.level == QualityLevel::Invalid => Some(ExclusionReason::InvalidGroup {
                variant: cell.variant.clone(),
                reasons: a.reasons.clone(),
            }),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::ComparisonStatus;
    use crate::quality::QualityController;
    use versus_core::{QualityConfig, Sample};

    fn group(task: &str, variant: &str, scale: Scale, center: f64, n: u32) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let t = center + (i % 5) as f64;
                Sample::succeeded(Cell::new(task, variant, scale), i, 1, t, 2048 + i as u64, None)
            })
            .collect()
    }

    #[test]
    fn test_pairs_and_exclusions() {
        let mut samples = Vec::new();
        samples.extend(group("sort", "rust", Scale::Small, 100.0, 30));
        samples.extend(group("sort", "go", Scale::Small, 150.0, 30));
        // Go is missing for the large scale
        samples.extend(group("sort", "rust", Scale::Large, 100.0, 30));
        // Too few go samples for the hash task
        samples.extend(group("hash", "rust", Scale::Small, 100.0, 30));
        samples.extend(group("hash", "go", Scale::Small, 100.0, 5));

        let quality = QualityController::new(QualityConfig::default()).clean(&samples);
        let variants = VariantPair::new("rust", "go");
        let report = StatisticalAnalyzer::default().analyze(&quality, &variants);

        assert_eq!(report.comparisons.len(), 2);
        assert!(report.comparisons.iter().all(|c| c.task == "sort" && c.scale == Scale::Small));
        assert_eq!(report.comparisons[0].metric, Metric::ExecutionTime);
        assert_eq!(report.comparisons[1].metric, Metric::MemoryUsage);
        let time = &report.comparisons[0].comparison;
        assert_eq!(time.status, ComparisonStatus::Compared);
        assert!(time.mean_difference < 0.0);

        assert_eq!(report.exclusions.len(), 2);
        assert!(report.exclusions.iter().any(|e| e.task == "hash"
            && matches!(&e.reason, ExclusionReason::InvalidGroup { variant, .. } if variant.as_str() == "go")));
        assert!(report.exclusions.iter().any(|e| e.scale == Scale::Large
            && matches!(&e.reason, ExclusionReason::MissingGroup { variant } if variant.as_str() == "go")));
    }
}
