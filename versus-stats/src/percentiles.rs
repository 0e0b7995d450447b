//! Percentile Computation
//!
//! Linear interpolation between nearest ranks, the same definition used for
//! the quartiles behind IQR outlier bounds.

use serde::{Deserialize, Serialize};

/// Percentiles reported for each group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    /// 25th percentile (Q1)
    pub p25: f64,
    /// Median
    pub p50: f64,
    /// 75th percentile (Q3)
    pub p75: f64,
    /// Tail
    pub p95: f64,
    /// Far tail
    pub p99: f64,
}

fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Percentile of an already sorted slice
fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let position = (percentile / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let below = position.floor() as usize;
            let above = (below + 1).min(n - 1);
            let weight = position - below as f64;
            sorted[below] + weight * (sorted[above] - sorted[below])
        }
    }
}

/// Percentile (0-100) of unsorted samples, 0 for an empty slice
///
/// ```
/// # use versus_stats::compute_percentile;
/// assert_eq!(compute_percentile(&[9.0, 1.0, 5.0], 50.0), 5.0);
/// ```
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    percentile_of_sorted(&sorted_copy(samples), percentile)
}

/// First and third quartile, sorting only once
pub fn quartiles(samples: &[f64]) -> (f64, f64) {
    let sorted = sorted_copy(samples);
    (
        percentile_of_sorted(&sorted, 25.0),
        percentile_of_sorted(&sorted, 75.0),
    )
}

/// The percentiles carried by [`crate::SummaryStatistics`]
pub fn compute_percentiles(samples: &[f64]) -> Percentiles {
    let sorted = sorted_copy(samples);
    Percentiles {
        p25: percentile_of_sorted(&sorted, 25.0),
        p50: percentile_of_sorted(&sorted, 50.0),
        p75: percentile_of_sorted(&sorted, 75.0),
        p95: percentile_of_sorted(&sorted, 95.0),
        p99: percentile_of_sorted(&sorted, 99.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        let samples = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        assert!((compute_percentile(&samples, 50.0) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quartiles_interpolate() {
        let samples: Vec<f64> = (1..=8).map(|x| x as f64).collect();
        let (q1, q3) = quartiles(&samples);
        // rank 1.75 and 5.25
        assert!((q1 - 2.75).abs() < 1e-12);
        assert!((q3 - 6.25).abs() < 1e-12);
    }

    #[test]
    fn test_single_and_empty() {
        assert_eq!(compute_percentile(&[42.0], 99.0), 42.0);
        assert_eq!(compute_percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_percentiles_are_ordered() {
        let samples: Vec<f64> = (1..=100).rev().map(f64::from).collect();
        let p = compute_percentiles(&samples);
        assert!(p.p25 < p.p50 && p.p50 < p.p75 && p.p75 < p.p95 && p.p95 < p.p99);
        assert!((p.p50 - 50.5).abs() < 1e-9);
    }
}
