//! Two-Group Comparison
//!
//! Welch's unequal-variance t-test and Cohen's d between the cleaned samples
//! of variant A and variant B. Differences are always `A - B`, so a positive
//! t or d means A has the larger (worse, for lower-is-better metrics) mean.

use crate::distribution::{normal_quantile, student_t_quantile, student_t_two_tailed_p};
use crate::summary::{SummaryStatistics, compute_summary};
use serde::{Deserialize, Serialize};
use std::fmt;
use versus_core::{EffectSizeThresholds, Metric, Scale, StatisticsConfig, VariantPair};

/// Qualitative size of a standardized effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectMagnitude {
    /// Below the small threshold
    Negligible,
    /// Small effect
    Small,
    /// Medium effect
    Medium,
    /// Large effect
    Large,
}

impl EffectMagnitude {
    /// Classify `|d|` against the configured thresholds
    pub fn classify(d: f64, thresholds: &EffectSizeThresholds) -> Self {
        let d = d.abs();
        if d >= thresholds.large {
            EffectMagnitude::Large
        } else if d >= thresholds.medium {
            EffectMagnitude::Medium
        } else if d >= thresholds.small {
            EffectMagnitude::Small
        } else {
            EffectMagnitude::Negligible
        }
    }
}

impl fmt::Display for EffectMagnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectMagnitude::Negligible => write!(f, "negligible"),
            EffectMagnitude::Small => write!(f, "small"),
            EffectMagnitude::Medium => write!(f, "medium"),
            EffectMagnitude::Large => write!(f, "large"),
        }
    }
}

/// How far the comparison got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    /// Full test statistics available
    Compared,
    /// Both groups are constant; reported as no difference
    NoVariance,
    /// A group is below the minimum sample count
    InsufficientData,
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonStatus::Compared => write!(f, "compared"),
            ComparisonStatus::NoVariance => write!(f, "no variance"),
            ComparisonStatus::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

/// Confidence interval of the mean difference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Confidence level, e.g. 0.95
    pub level: f64,
}

impl ConfidenceInterval {
    /// Whether the interval excludes zero
    pub fn excludes_zero(&self) -> bool {
        self.lower > 0.0 || self.upper < 0.0
    }
}

/// Welch's t-test result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WelchTest {
    /// t statistic
    pub t_statistic: f64,
    /// Welch–Satterthwaite degrees of freedom
    pub degrees_of_freedom: f64,
    /// Two-tailed p-value
    pub p_value: f64,
    /// Interval around `mean_a - mean_b`
    pub confidence_interval: ConfidenceInterval,
}

/// Cohen's d with its interpretation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSize {
    /// Standardized mean difference using the pooled standard deviation
    pub cohens_d: f64,
    /// Qualitative magnitude
    pub magnitude: EffectMagnitude,
    /// `|d| >= minimum_detectable_effect`
    pub meets_mde: bool,
}

/// Whether the sample sizes can resolve the configured minimum effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerCheck {
    /// Smallest d detectable at the configured alpha and power
    pub achievable_mde: f64,
    /// `achievable_mde > minimum_detectable_effect`
    pub underpowered: bool,
}

/// Numeric comparison of two groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// How far the comparison got
    pub status: ComparisonStatus,
    /// Summary of group A
    pub stats_a: SummaryStatistics,
    /// Summary of group B
    pub stats_b: SummaryStatistics,
    /// `mean_a - mean_b`
    pub mean_difference: f64,
    /// Absent when data is insufficient
    pub welch: Option<WelchTest>,
    /// Absent when data is insufficient
    pub effect: Option<EffectSize>,
    /// Absent when data is insufficient
    pub power: Option<PowerCheck>,
}

impl Comparison {
    /// p-value, 1 when no test was run
    pub fn p_value(&self) -> f64 {
        self.welch.map_or(1.0, |w| w.p_value)
    }

    /// Cohen's d, 0 when not computed
    pub fn cohens_d(&self) -> f64 {
        self.effect.map_or(0.0, |e| e.cohens_d)
    }

    /// Effect magnitude, negligible when not computed
    pub fn magnitude(&self) -> EffectMagnitude {
        self.effect.map_or(EffectMagnitude::Negligible, |e| e.magnitude)
    }

    /// Whether the difference is significant at `alpha`
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.status == ComparisonStatus::Compared && self.p_value() < alpha
    }
}

/// Comparison of the two variants for one (task, scale, metric)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Task name
    pub task: String,
    /// Scale
    pub scale: Scale,
    /// Metric compared
    pub metric: Metric,
    /// Variants in (A, B) order
    pub variants: VariantPair,
    /// Test outcome
    pub comparison: Comparison,
}

/// Compare groups `a` and `b` with Welch's t-test and Cohen's d
pub fn compare(a: &[f64], b: &[f64], config: &StatisticsConfig) -> Comparison {
    let stats_a = compute_summary(a);
    let stats_b = compute_summary(b);
    let mean_difference = stats_a.mean - stats_b.mean;

    if stats_a.n < config.min_samples.max(2) || stats_b.n < config.min_samples.max(2) {
        return Comparison {
            status: ComparisonStatus::InsufficientData,
            stats_a,
            stats_b,
            mean_difference,
            welch: None,
            effect: None,
            power: None,
        };
    }

    let n1 = stats_a.n as f64;
    let n2 = stats_b.n as f64;
    let power = power_check(n1, n2, config);

    if stats_a.has_zero_variance() && stats_b.has_zero_variance() {
        return Comparison {
            status: ComparisonStatus::NoVariance,
            stats_a,
            stats_b,
            mean_difference,
            welch: Some(WelchTest {
                t_statistic: 0.0,
                degrees_of_freedom: n1 + n2 - 2.0,
                p_value: 1.0,
                confidence_interval: ConfidenceInterval {
                    lower: mean_difference,
                    upper: mean_difference,
                    level: config.confidence_level,
                },
            }),
            effect: Some(EffectSize {
                cohens_d: 0.0,
                magnitude: EffectMagnitude::Negligible,
                meets_mde: false,
            }),
            power: Some(power),
        };
    }

    let va = stats_a.variance / n1;
    let vb = stats_b.variance / n2;
    let se = (va + vb).sqrt();
    let t = mean_difference / se;
    let df = (va + vb).powi(2) / (va.powi(2) / (n1 - 1.0) + vb.powi(2) / (n2 - 1.0));
    let p = student_t_two_tailed_p(t, df);
    let t_crit = student_t_quantile(1.0 - (1.0 - config.confidence_level) / 2.0, df);

    let pooled_sd = (((n1 - 1.0) * stats_a.variance + (n2 - 1.0) * stats_b.variance)
        / (n1 + n2 - 2.0))
        .sqrt();
    let d = if pooled_sd > 0.0 {
        mean_difference / pooled_sd
    } else {
        0.0
    };

    Comparison {
        status: ComparisonStatus::Compared,
        stats_a,
        stats_b,
        mean_difference,
        welch: Some(WelchTest {
            t_statistic: t,
            degrees_of_freedom: df,
            p_value: p,
            confidence_interval: ConfidenceInterval {
                lower: mean_difference - t_crit * se,
                upper: mean_difference + t_crit * se,
                level: config.confidence_level,
            },
        }),
        effect: Some(EffectSize {
            cohens_d: d,
            magnitude: EffectMagnitude::classify(d, &config.effect_size_thresholds),
            meets_mde: d.abs() >= config.minimum_detectable_effect,
        }),
        power: Some(power),
    }
}

/// `(z(1 - α/2) + z(power)) · √(1/n1 + 1/n2)`
fn power_check(n1: f64, n2: f64, config: &StatisticsConfig) -> PowerCheck {
    let z_alpha = normal_quantile(1.0 - config.significance_alpha / 2.0);
    let z_power = normal_quantile(config.power);
    let achievable_mde = (z_alpha + z_power) * (1.0 / n1 + 1.0 / n2).sqrt();
    PowerCheck {
        achievable_mde,
        underpowered: achievable_mde > config.minimum_detectable_effect,
    }
}
