//! Summary Statistics
//!
//! Descriptive statistics of one cleaned group. Variance and standard
//! deviation use the sample (n - 1) estimator; the coefficient of variation is
//! reported as a ratio, not a percentage.

use crate::percentiles::compute_percentiles;
use serde::{Deserialize, Serialize};

/// Descriptive statistics for one group of values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Number of values
    pub n: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample variance
    pub variance: f64,
    /// Sample standard deviation
    pub std_dev: f64,
    /// Median
    pub median: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// 95th percentile
    pub p95: f64,
    /// std_dev / mean, 0 when the mean is 0
    pub cv: f64,
}

impl SummaryStatistics {
    /// Statistics of an empty group
    pub const EMPTY: SummaryStatistics = SummaryStatistics {
        n: 0,
        mean: 0.0,
        variance: 0.0,
        std_dev: 0.0,
        median: 0.0,
        min: 0.0,
        max: 0.0,
        p95: 0.0,
        cv: 0.0,
    };

    /// Whether every value in the group is identical
    pub fn has_zero_variance(&self) -> bool {
        self.variance <= f64::EPSILON * self.mean.abs().max(1.0)
    }
}

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator), 0 below two values
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Coefficient of variation as a ratio
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        0.0
    } else {
        sample_variance(values).sqrt() / m.abs()
    }
}

/// Compute summary statistics over `values`
pub fn compute_summary(values: &[f64]) -> SummaryStatistics {
    if values.is_empty() {
        return SummaryStatistics::EMPTY;
    }

    let mean = mean(values);
    let variance = sample_variance(values);
    let std_dev = variance.sqrt();
    let percentiles = compute_percentiles(values);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    SummaryStatistics {
        n: values.len(),
        mean,
        variance,
        std_dev,
        median: percentiles.p50,
        min,
        max,
        p95: percentiles.p95,
        cv: if mean == 0.0 { 0.0 } else { std_dev / mean.abs() },
    }
}
