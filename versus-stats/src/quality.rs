//! Quality Controller
//!
//! Turns the flat sample collection into per-cell groups that are safe to
//! compare:
//!
//! ```text
//! samples ──► group by cell ──► drop failed trials ──► IQR fences (per metric)
//!                                                            │
//!          DatasetVerdict ◄── QualityAssessment ◄── CV stability on retained
//! ```
//!
//! Quality problems annotate the report. They never stop the pipeline.

use crate::outliers::{BoundSide, OutlierBounds};
use crate::summary::compute_summary;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use versus_core::{Cell, FailureReason, Metric, QualityConfig, Sample};

/// Usability of a group, or of the whole dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    /// Fit for comparison
    Valid,
    /// Usable, with stability concerns
    Warning,
    /// Excluded from comparison
    Invalid,
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityLevel::Valid => write!(f, "valid"),
            QualityLevel::Warning => write!(f, "warning"),
            QualityLevel::Invalid => write!(f, "invalid"),
        }
    }
}

/// Why a sample was dropped from its group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemovalReason {
    /// Outside the IQR fences of a metric
    Outlier {
        /// Metric whose fence was crossed
        metric: Metric,
        /// The sample's value for that metric
        value: f64,
        /// The fence that was crossed
        bound: f64,
        /// Which fence
        side: BoundSide,
    },
    /// The trial did not succeed
    FailedTrial {
        /// Failure recorded by the orchestrator
        reason: Option<FailureReason>,
    },
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalReason::Outlier {
                metric,
                value,
                bound,
                side,
            } => {
                let op = match side {
                    BoundSide::Lower => "<",
                    BoundSide::Upper => ">",
                };
                write!(f, "outlier: {} {:.3} {} {:.3}", metric, value, op, bound)
            }
            RemovalReason::FailedTrial { reason: Some(r) } => write!(f, "failed trial: {}", r),
            RemovalReason::FailedTrial { reason: None } => write!(f, "failed trial"),
        }
    }
}

/// A dropped sample with its reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedSample {
    /// The original sample
    pub sample: Sample,
    /// Why it was dropped
    pub reason: RemovalReason,
}

/// Samples of one cell after cleaning. `retained + removed` is always the
/// number of samples the cell had.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedGroup {
    /// Cell the samples belong to
    pub cell: Cell,
    /// Successful samples inside every metric's fences
    pub retained: Vec<Sample>,
    /// Everything else
    pub removed: Vec<RemovedSample>,
    /// Outlier fences applied, absent when the group was too small
    pub bounds: Vec<(Metric, OutlierBounds)>,
}

impl CleanedGroup {
    /// Samples the cell had before cleaning
    pub fn original_count(&self) -> usize {
        self.retained.len() + self.removed.len()
    }

    /// Retained values of one metric
    pub fn values(&self, metric: Metric) -> Vec<f64> {
        self.retained.iter().map(|s| metric.value(s)).collect()
    }

    /// Number of samples removed as failed trials
    pub fn failed_trials(&self) -> usize {
        self.removed
            .iter()
            .filter(|r| matches!(r.reason, RemovalReason::FailedTrial { .. }))
            .count()
    }

    /// Number of samples removed as outliers
    pub fn outliers(&self) -> usize {
        self.removed.len() - self.failed_trials()
    }

    /// Successful trials / all trials
    pub fn success_rate(&self) -> f64 {
        let total = self.original_count();
        if total == 0 {
            0.0
        } else {
            (total - self.failed_trials()) as f64 / total as f64
        }
    }
}

/// Stability of one metric in a cleaned group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStability {
    /// Metric measured
    pub metric: Metric,
    /// Mean of retained values
    pub mean: f64,
    /// Sample standard deviation of retained values
    pub std_dev: f64,
    /// Coefficient of variation
    pub cv: f64,
    /// Whether this metric decides the group's level
    pub gating: bool,
}

/// Verdict on one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Cell assessed
    pub cell: Cell,
    /// Resulting level
    pub level: QualityLevel,
    /// Reasons behind a non-valid level
    pub reasons: Vec<String>,
    /// Observations that did not affect the level
    pub notes: Vec<String>,
    /// Per-metric stability
    pub stability: Vec<MetricStability>,
    /// Samples kept
    pub retained: usize,
    /// Samples dropped as outliers
    pub outliers_removed: usize,
    /// Samples dropped as failed trials
    pub failed_trials: usize,
    /// Successful / total trials
    pub success_rate: f64,
}

/// Verdict on the dataset as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVerdict {
    /// Resulting level
    pub level: QualityLevel,
    /// Number of groups assessed
    pub total_groups: usize,
    /// Groups assessed invalid
    pub invalid_groups: usize,
    /// Groups assessed warning
    pub warning_groups: usize,
    /// Explanation of a non-valid level
    pub reasons: Vec<String>,
}

/// Output of [`QualityController::clean`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Cleaned groups in cell order
    pub groups: Vec<CleanedGroup>,
    /// One assessment per group, same order
    pub assessments: Vec<QualityAssessment>,
    /// Dataset-level verdict
    pub dataset: DatasetVerdict,
}

impl QualityReport {
    /// Cleaned group of a cell
    pub fn group(&self, cell: &Cell) -> Option<&CleanedGroup> {
        self.groups.iter().find(|g| &g.cell == cell)
    }

    /// Assessment of a cell
    pub fn assessment(&self, cell: &Cell) -> Option<&QualityAssessment> {
        self.assessments.iter().find(|a| &a.cell == cell)
    }

    /// Total outliers removed across every group
    pub fn total_outliers(&self) -> usize {
        self.groups.iter().map(CleanedGroup::outliers).sum()
    }
}

/// Cleans and assesses sample groups
#[derive(Debug, Clone, Default)]
pub struct QualityController {
    config: QualityConfig,
}

impl QualityController {
    /// Controller using `config`
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Settings in use
    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Group, clean and assess `samples`
    pub fn clean(&self, samples: &[Sample]) -> QualityReport {
        let mut by_cell: FxHashMap<&Cell, Vec<&Sample>> = FxHashMap::default();
        for sample in samples {
            by_cell.entry(&sample.cell).or_default().push(sample);
        }
        let mut cells: Vec<_> = by_cell.into_iter().collect();
        cells.sort_by(|(a, _), (b, _)| a.cmp(b));

        let groups: Vec<CleanedGroup> = cells
            .into_iter()
            .map(|(cell, samples)| self.clean_group(cell, &samples))
            .collect();
        let assessments: Vec<QualityAssessment> =
            groups.iter().map(|g| self.assess(g)).collect();
        let dataset = self.verdict(&assessments);

        info!(
            groups = groups.len(),
            outliers = groups.iter().map(CleanedGroup::outliers).sum::<usize>(),
            level = %dataset.level,
            "quality control finished"
        );
        QualityReport {
            groups,
            assessments,
            dataset,
        }
    }

    /// Clean one cell's samples
    pub fn clean_group(&self, cell: &Cell, samples: &[&Sample]) -> CleanedGroup {
        let mut removed = Vec::new();
        let mut successful = Vec::with_capacity(samples.len());
        for &sample in samples {
            if sample.success {
                successful.push(sample);
            } else {
                removed.push(RemovedSample {
                    sample: sample.clone(),
                    reason: RemovalReason::FailedTrial {
                        reason: sample.failure_reason.clone(),
                    },
                });
            }
        }

        // Fences for every metric come from the same successful set
        let bounds: Vec<(Metric, OutlierBounds)> = if successful.len() >= self.config.min_iqr_samples
        {
            Metric::ALL
                .iter()
                .map(|&metric| {
                    let values: Vec<f64> = successful.iter().map(|s| metric.value(s)).collect();
                    (
                        metric,
                        OutlierBounds::iqr(&values, self.config.outlier_iqr_multiplier),
                    )
                })
                .collect()
        } else {
            debug!(%cell, n = successful.len(), "too few samples for outlier detection");
            Vec::new()
        };

        let mut retained = Vec::with_capacity(successful.len());
        for sample in successful {
            let violation = bounds.iter().find_map(|&(metric, fence)| {
                let value = metric.value(sample);
                fence.violated_by(value).map(|side| RemovalReason::Outlier {
                    metric,
                    value,
                    bound: fence.bound(side),
                    side,
                })
            });
            match violation {
                Some(reason) => {
                    warn!(%cell, trial = sample.trial, "removed {}", reason);
                    removed.push(RemovedSample {
                        sample: sample.clone(),
                        reason,
                    });
                }
                None => retained.push(sample.clone()),
            }
        }

        CleanedGroup {
            cell: cell.clone(),
            retained,
            removed,
            bounds,
        }
    }

    /// Classify one cleaned group
    pub fn assess(&self, group: &CleanedGroup) -> QualityAssessment {
        let mut level = QualityLevel::Valid;
        let mut reasons = Vec::new();
        let mut notes = Vec::new();

        let retained = group.retained.len();
        if retained < self.config.min_valid_samples {
            level = level.max(QualityLevel::Invalid);
            reasons.push(format!(
                "only {} valid samples (minimum {})",
                retained, self.config.min_valid_samples
            ));
        }

        let success_rate = group.success_rate();
        if success_rate < self.config.min_success_rate {
            level = level.max(QualityLevel::Invalid);
            reasons.push(format!(
                "success rate {:.1}% below {:.1}%",
                success_rate * 100.0,
                self.config.min_success_rate * 100.0
            ));
        }

        let limits = self.config.cv_thresholds_for(&group.cell.variant);
        let mut stability = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let summary = compute_summary(&group.values(metric));
            let gating = self.config.gating_metrics.contains(&metric);
            stability.push(MetricStability {
                metric,
                mean: summary.mean,
                std_dev: summary.std_dev,
                cv: summary.cv,
                gating,
            });

            let (to, message) = if summary.cv > limits.extreme_cv {
                (
                    QualityLevel::Invalid,
                    format!(
                        "{} CV {:.1}% exceeds extreme limit {:.1}%",
                        metric,
                        summary.cv * 100.0,
                        limits.extreme_cv * 100.0
                    ),
                )
            } else if summary.cv > limits.max_cv {
                (
                    QualityLevel::Warning,
                    format!(
                        "{} CV {:.1}% exceeds {:.1}%",
                        metric,
                        summary.cv * 100.0,
                        limits.max_cv * 100.0
                    ),
                )
            } else {
                continue;
            };
            if gating {
                level = level.max(to);
                reasons.push(message);
            } else {
                notes.push(message);
            }
        }

        if group.outliers() > 0 {
            notes.push(format!("{} outliers removed", group.outliers()));
        }

        debug!(cell = %group.cell, %level, retained, "group assessed");
        QualityAssessment {
            cell: group.cell.clone(),
            level,
            reasons,
            notes,
            stability,
            retained,
            outliers_removed: group.outliers(),
            failed_trials: group.failed_trials(),
            success_rate,
        }
    }

    /// Dataset verdict from the group assessments
    pub fn verdict(&self, assessments: &[QualityAssessment]) -> DatasetVerdict {
        let total_groups = assessments.len();
        let count = |level| assessments.iter().filter(|a| a.level == level).count();
        let invalid_groups = count(QualityLevel::Invalid);
        let warning_groups = count(QualityLevel::Warning);

        if total_groups == 0 {
            return DatasetVerdict {
                level: QualityLevel::Invalid,
                total_groups,
                invalid_groups,
                warning_groups,
                reasons: vec!["no sample groups".to_string()],
            };
        }

        let invalid_share = invalid_groups as f64 / total_groups as f64;
        let warning_share = warning_groups as f64 / total_groups as f64;
        let (level, reasons) = if invalid_share > self.config.invalid_group_fraction {
            (
                QualityLevel::Invalid,
                vec![format!(
                    "{} of {} groups invalid ({:.0}% > {:.0}%)",
                    invalid_groups,
                    total_groups,
                    invalid_share * 100.0,
                    self.config.invalid_group_fraction * 100.0
                )],
            )
        } else if warning_share > self.config.warning_group_fraction {
            (
                QualityLevel::Warning,
                vec![format!(
                    "{} of {} groups unstable ({:.0}% > {:.0}%)",
                    warning_groups,
                    total_groups,
                    warning_share * 100.0,
                    self.config.warning_group_fraction * 100.0
                )],
            )
        } else {
            (QualityLevel::Valid, Vec::new())
        };

        DatasetVerdict {
            level,
            total_groups,
            invalid_groups,
            warning_groups,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use versus_core::{CvThresholds, Scale, VariantId};

    fn cell(variant: &str) -> Cell {
        Cell::new("sort", variant, Scale::Small)
    }

    fn samples(variant: &str, times: &[f64]) -> Vec<Sample> {
        times
            .iter()
            .enumerate()
            .map(|(i, &t)| Sample::succeeded(cell(variant), i as u32, 1, t, 1024, Some(7)))
            .collect()
    }

    fn steady(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i % 5) as f64).collect()
    }

    #[test]
    fn test_clean_group_keeps_every_sample_accounted_for() {
        let mut times = steady(29);
        times.push(5000.0);
        let mut all = samples("rust", &times);
        all.push(Sample::failed(cell("rust"), 30, 3, FailureReason::Timeout));

        let report = QualityController::default().clean(&all);
        let group = &report.groups[0];
        assert_eq!(group.original_count(), 31);
        assert_eq!(group.retained.len(), 29);
        assert_eq!(group.outliers(), 1);
        assert_eq!(group.failed_trials(), 1);

        let outlier = group
            .removed
            .iter()
            .find(|r| matches!(r.reason, RemovalReason::Outlier { .. }))
            .unwrap();
        match &outlier.reason {
            RemovalReason::Outlier {
                metric,
                value,
                side,
                bound,
            } => {
                assert_eq!(*metric, Metric::ExecutionTime);
                assert_eq!(*value, 5000.0);
                assert_eq!(*side, BoundSide::Upper);
                assert!(*bound < 5000.0);
            }
            _ => unreachable!(),
        }
        assert_eq!(report.assessments[0].level, QualityLevel::Valid);
    }

    #[test]
    fn test_small_group_skips_outlier_detection() {
        let report = QualityController::default().clean(&samples("rust", &[1.0, 2.0, 900.0]));
        assert!(report.groups[0].bounds.is_empty());
        assert_eq!(report.groups[0].retained.len(), 3);
        // Too few samples to be usable
        assert_eq!(report.assessments[0].level, QualityLevel::Invalid);
    }

    #[test]
    fn test_low_success_rate_is_invalid() {
        let mut all = samples("rust", &steady(20));
        for i in 0..5 {
            all.push(Sample::failed(
                cell("rust"),
                20 + i,
                3,
                FailureReason::ExecutionFailure("boom".into()),
            ));
        }
        let report = QualityController::default().clean(&all);
        let a = &report.assessments[0];
        assert_eq!(a.level, QualityLevel::Invalid);
        assert!((a.success_rate - 0.8).abs() < 1e-12);
        assert!(a.reasons.iter().any(|r| r.contains("success rate")));
    }

    #[test]
    fn test_cv_levels_and_variant_override() {
        // Alternating 50 / 150 has CV just above 0.5
        let noisy: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 50.0 } else { 150.0 }).collect();
        let mut all = samples("go", &noisy);
        all.extend(samples("rust", &noisy));

        let mut config = QualityConfig::default();
        config.variant_cv.insert(
            VariantId::new("rust"),
            CvThresholds {
                max_cv: 0.6,
                extreme_cv: 1.0,
            },
        );
        let report = QualityController::new(config).clean(&all);
        assert_eq!(report.assessment(&cell("go")).unwrap().level, QualityLevel::Warning);
        assert_eq!(report.assessment(&cell("rust")).unwrap().level, QualityLevel::Valid);
    }

    #[test]
    fn test_non_gating_metric_only_adds_notes() {
        let times = steady(30);
        let all: Vec<Sample> = times
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let mem = if i % 2 == 0 { 1_000 } else { 9_000 };
                Sample::succeeded(cell("rust"), i as u32, 1, t, mem, None)
            })
            .collect();
        let report = QualityController::default().clean(&all);
        let a = &report.assessments[0];
        assert_eq!(a.level, QualityLevel::Valid);
        assert!(a.notes.iter().any(|n| n.contains("memory_usage")));
    }

    #[test]
    fn test_dataset_verdict_thresholds() {
        let qc = QualityController::default();
        let assessment = |level| QualityAssessment {
            cell: cell("rust"),
            level,
            reasons: Vec::new(),
            notes: Vec::new(),
            stability: Vec::new(),
            retained: 0,
            outliers_removed: 0,
            failed_trials: 0,
            success_rate: 1.0,
        };

        assert_eq!(qc.verdict(&[]).level, QualityLevel::Invalid);

        let mut many = vec![assessment(QualityLevel::Valid); 9];
        many.push(assessment(QualityLevel::Invalid));
        assert_eq!(qc.verdict(&many).level, QualityLevel::Valid);

        many.push(assessment(QualityLevel::Invalid));
        assert_eq!(qc.verdict(&many).level, QualityLevel::Invalid);

        let mut warned = vec![assessment(QualityLevel::Valid); 6];
        warned.extend(vec![assessment(QualityLevel::Warning); 4]);
        assert_eq!(qc.verdict(&warned).level, QualityLevel::Warning);
    }
}
