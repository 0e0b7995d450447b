//! Configuration Value Objects
//!
//! Each pipeline component receives its own section of [`PipelineConfig`] at
//! construction time. Nothing reads process-wide state; a config is validated
//! once and then treated as immutable.

use crate::model::{Metric, ValidationError, VariantId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Complete configuration for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scheduling, timeouts, retries, abort threshold
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Outlier removal and group classification
    #[serde(default)]
    pub quality: QualityConfig,
    /// Hypothesis testing and effect size
    #[serde(default)]
    pub statistics: StatisticsConfig,
    /// Cross-variant digest validation
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Recommendation aggregation
    #[serde(default)]
    pub decision: DecisionConfig,
}

impl PipelineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.orchestrator.validate()?;
        self.quality.validate()?;
        self.statistics.validate()?;
        self.validation.validate()?;
        self.decision.validate()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("{} is outside [0, 1]", value)));
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(field, format!("{} must be positive", value)));
    }
    Ok(())
}

/// Multipliers applied to the base timeout for each operation category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutMultipliers {
    /// Runner connection handshake
    #[serde(default = "default_connection_multiplier")]
    pub connection: f64,
    /// A single standard trial
    #[serde(default = "default_execution_multiplier")]
    pub execution: f64,
    /// Waiting for a free runner context
    #[serde(default = "default_resource_wait_multiplier")]
    pub resource_wait: f64,
    /// A single heavy-workload trial
    #[serde(default = "default_heavy_multiplier")]
    pub heavy_workload: f64,
}

impl Default for TimeoutMultipliers {
    fn default() -> Self {
        Self {
            connection: default_connection_multiplier(),
            execution: default_execution_multiplier(),
            resource_wait: default_resource_wait_multiplier(),
            heavy_workload: default_heavy_multiplier(),
        }
    }
}

fn default_connection_multiplier() -> f64 {
    2.0
}
fn default_execution_multiplier() -> f64 {
    2.5
}
fn default_resource_wait_multiplier() -> f64 {
    0.25
}
fn default_heavy_multiplier() -> f64 {
    3.0
}

/// Timeout hierarchy derived from one base value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Base timeout every category is derived from
    #[serde(default = "default_base_timeout")]
    pub base_timeout: Duration,
    /// Per-category multipliers
    #[serde(default)]
    pub multipliers: TimeoutMultipliers,
    /// Fast-feedback mode, scaling every timeout by `quick_mode_factor`
    #[serde(default)]
    pub quick_mode: bool,
    /// Scale factor applied in quick mode
    #[serde(default = "default_quick_mode_factor")]
    pub quick_mode_factor: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            base_timeout: default_base_timeout(),
            multipliers: TimeoutMultipliers::default(),
            quick_mode: false,
            quick_mode_factor: default_quick_mode_factor(),
        }
    }
}

fn default_base_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_quick_mode_factor() -> f64 {
    0.1
}

/// How cells are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    /// One cell at a time, in plan order
    Sequential,
    /// Sliding window of up to `max_concurrency` cells
    #[default]
    Parallel,
}

/// Retry and backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per trial, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Relative random jitter applied to each delay (0 disables)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> Duration {
    Duration::from_millis(200)
}
fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}

/// Orchestrator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Timeout hierarchy
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Dispatch mode
    #[serde(default)]
    pub scheduling: SchedulingMode,
    /// Maximum cells in flight in parallel mode
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retry policy for trials and connection handshakes
    #[serde(default)]
    pub retry: RetryConfig,
    /// Failure rate above which the run aborts
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Completed trials required before the failure rate is evaluated
    #[serde(default = "default_min_trials_before_abort")]
    pub min_trials_before_abort: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            scheduling: SchedulingMode::default(),
            max_concurrency: default_max_concurrency(),
            retry: RetryConfig::default(),
            failure_threshold: default_failure_threshold(),
            min_trials_before_abort: default_min_trials_before_abort(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}
fn default_failure_threshold() -> f64 {
    0.1
}
fn default_min_trials_before_abort() -> usize {
    5
}

impl OrchestratorConfig {
    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeouts.base_timeout.is_zero() {
            return Err(invalid("base_timeout", "must be greater than zero"));
        }
        let m = &self.timeouts.multipliers;
        check_positive("timeout_multipliers.connection", m.connection)?;
        check_positive("timeout_multipliers.execution", m.execution)?;
        check_positive("timeout_multipliers.resource_wait", m.resource_wait)?;
        check_positive("timeout_multipliers.heavy_workload", m.heavy_workload)?;
        check_positive("quick_mode_factor", self.timeouts.quick_mode_factor)?;
        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", "must be at least 1.0"));
        }
        check_fraction("retry.jitter", self.retry.jitter)?;
        check_fraction("failure_threshold", self.failure_threshold)
    }
}

/// Coefficient-of-variation limits for one execution environment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvThresholds {
    /// Soft limit: exceeding it downgrades a group to warning
    #[serde(default = "default_max_cv")]
    pub max_cv: f64,
    /// Hard ceiling: exceeding it invalidates a group
    #[serde(default = "default_extreme_cv")]
    pub extreme_cv: f64,
}

impl Default for CvThresholds {
    fn default() -> Self {
        Self {
            max_cv: default_max_cv(),
            extreme_cv: default_extreme_cv(),
        }
    }
}

fn default_max_cv() -> f64 {
    0.15
}
fn default_extreme_cv() -> f64 {
    1.0
}

/// Quality controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// IQR multiplier `k` for outlier bounds
    #[serde(default = "default_iqr_multiplier")]
    pub outlier_iqr_multiplier: f64,
    /// Groups smaller than this skip outlier removal
    #[serde(default = "default_min_iqr_samples")]
    pub min_iqr_samples: usize,
    /// Retained samples required for a usable group
    #[serde(default = "default_min_valid_samples")]
    pub min_valid_samples: usize,
    /// Minimum successful / total trial ratio
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Default CV limits
    #[serde(default)]
    pub cv: CvThresholds,
    /// CV limits overriding the default for specific variants
    #[serde(default)]
    pub variant_cv: BTreeMap<VariantId, CvThresholds>,
    /// Metrics whose stability decides a group's level
    #[serde(default = "default_gating_metrics")]
    pub gating_metrics: Vec<Metric>,
    /// Invalid-group share above which the dataset is invalid
    #[serde(default = "default_invalid_group_fraction")]
    pub invalid_group_fraction: f64,
    /// Warning-group share above which the dataset is a warning
    #[serde(default = "default_warning_group_fraction")]
    pub warning_group_fraction: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            outlier_iqr_multiplier: default_iqr_multiplier(),
            min_iqr_samples: default_min_iqr_samples(),
            min_valid_samples: default_min_valid_samples(),
            min_success_rate: default_min_success_rate(),
            cv: CvThresholds::default(),
            variant_cv: BTreeMap::new(),
            gating_metrics: default_gating_metrics(),
            invalid_group_fraction: default_invalid_group_fraction(),
            warning_group_fraction: default_warning_group_fraction(),
        }
    }
}

fn default_iqr_multiplier() -> f64 {
    1.5
}
fn default_min_iqr_samples() -> usize {
    4
}
fn default_min_valid_samples() -> usize {
    20
}
fn default_min_success_rate() -> f64 {
    0.9
}
fn default_gating_metrics() -> Vec<Metric> {
    vec![Metric::ExecutionTime]
}
fn default_invalid_group_fraction() -> f64 {
    0.15
}
fn default_warning_group_fraction() -> f64 {
    0.3
}

impl QualityConfig {
    /// CV limits for a variant, falling back to the default
    pub fn cv_thresholds_for(&self, variant: &VariantId) -> CvThresholds {
        self.variant_cv.get(variant).copied().unwrap_or(self.cv)
    }

    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_positive("outlier_iqr_multiplier", self.outlier_iqr_multiplier)?;
        if self.min_iqr_samples < 4 {
            return Err(invalid("min_iqr_samples", "quartiles need at least 4 samples"));
        }
        if self.min_valid_samples < 2 {
            return Err(invalid("min_valid_samples", "must be at least 2"));
        }
        check_fraction("min_success_rate", self.min_success_rate)?;
        for cv in std::iter::once(&self.cv).chain(self.variant_cv.values()) {
            check_positive("max_cv", cv.max_cv)?;
            if cv.extreme_cv < cv.max_cv {
                return Err(invalid("extreme_cv", "must not be below max_cv"));
            }
        }
        if self.gating_metrics.is_empty() {
            return Err(invalid("gating_metrics", "at least one metric must gate"));
        }
        check_fraction("invalid_group_fraction", self.invalid_group_fraction)?;
        check_fraction("warning_group_fraction", self.warning_group_fraction)
    }
}

/// Cohen's d magnitude boundaries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSizeThresholds {
    /// Lower bound of a small effect
    #[serde(default = "default_small_effect")]
    pub small: f64,
    /// Lower bound of a medium effect
    #[serde(default = "default_medium_effect")]
    pub medium: f64,
    /// Lower bound of a large effect
    #[serde(default = "default_large_effect")]
    pub large: f64,
}

impl Default for EffectSizeThresholds {
    fn default() -> Self {
        Self {
            small: default_small_effect(),
            medium: default_medium_effect(),
            large: default_large_effect(),
        }
    }
}

fn default_small_effect() -> f64 {
    0.2
}
fn default_medium_effect() -> f64 {
    0.5
}
fn default_large_effect() -> f64 {
    0.8
}

/// Statistical analyzer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Significance level α
    #[serde(default = "default_alpha")]
    pub significance_alpha: f64,
    /// Confidence level of the difference interval
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// Effect size magnitude boundaries
    #[serde(default)]
    pub effect_size_thresholds: EffectSizeThresholds,
    /// Smallest |d| worth detecting
    #[serde(default = "default_mde")]
    pub minimum_detectable_effect: f64,
    /// Target statistical power for the achievable-MDE estimate
    #[serde(default = "default_power")]
    pub power: f64,
    /// Minimum samples per group before a comparison is attempted
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            significance_alpha: default_alpha(),
            confidence_level: default_confidence_level(),
            effect_size_thresholds: EffectSizeThresholds::default(),
            minimum_detectable_effect: default_mde(),
            power: default_power(),
            min_samples: default_min_samples(),
        }
    }
}

fn default_alpha() -> f64 {
    0.05
}
fn default_confidence_level() -> f64 {
    0.95
}
fn default_mde() -> f64 {
    0.3
}
fn default_power() -> f64 {
    0.8
}
fn default_min_samples() -> usize {
    5
}

impl StatisticsConfig {
    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.significance_alpha > 0.0 && self.significance_alpha < 1.0) {
            return Err(invalid("significance_alpha", "must lie in (0, 1)"));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(invalid("confidence_level", "must lie in (0, 1)"));
        }
        if !(self.power > 0.0 && self.power < 1.0) {
            return Err(invalid("power", "must lie in (0, 1)"));
        }
        let t = &self.effect_size_thresholds;
        if !(0.0 <= t.small && t.small <= t.medium && t.medium <= t.large) {
            return Err(invalid(
                "effect_size_thresholds",
                "must satisfy 0 <= small <= medium <= large",
            ));
        }
        check_positive("minimum_detectable_effect", self.minimum_detectable_effect)?;
        if self.min_samples < 2 {
            return Err(invalid("min_samples", "variance needs at least 2 samples"));
        }
        Ok(())
    }
}

/// An extra digest accepted for a task, with the reason it is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedDigest {
    /// The accepted digest value
    pub digest: u32,
    /// Audit note explaining the divergence
    pub reason: String,
}

/// Cross-variant validator settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Variant whose digests form the reference oracle (defaults to variant `a`)
    #[serde(default)]
    pub trusted_variant: Option<VariantId>,
    /// Per-task allow-list of additional acceptable digests
    #[serde(default)]
    pub allow_list: BTreeMap<String, Vec<AllowedDigest>>,
}

impl ValidationConfig {
    /// Every allow-list entry must carry a reason
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (task, entries) in &self.allow_list {
            if let Some(entry) = entries.iter().find(|e| e.reason.trim().is_empty()) {
                return Err(invalid(
                    "allow_list",
                    format!(
                        "entry {:#010x} for task '{}' has no reason",
                        entry.digest, task
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Weight of each metric in the per-task score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    /// Execution time weight
    #[serde(default = "default_execution_weight")]
    pub execution_time: f64,
    /// Memory usage weight
    #[serde(default = "default_memory_weight")]
    pub memory_usage: f64,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            execution_time: default_execution_weight(),
            memory_usage: default_memory_weight(),
        }
    }
}

fn default_execution_weight() -> f64 {
    1.0
}
fn default_memory_weight() -> f64 {
    0.5
}

impl MetricWeights {
    /// Weight for a metric
    pub fn weight(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ExecutionTime => self.execution_time,
            Metric::MemoryUsage => self.memory_usage,
        }
    }
}

/// Weight of each confidence tier in the tallies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    /// High-confidence weight
    #[serde(default = "default_high_weight")]
    pub high: f64,
    /// Medium-confidence weight
    #[serde(default = "default_medium_weight")]
    pub medium: f64,
    /// Low-confidence weight
    #[serde(default = "default_low_weight")]
    pub low: f64,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            high: default_high_weight(),
            medium: default_medium_weight(),
            low: default_low_weight(),
        }
    }
}

fn default_high_weight() -> f64 {
    3.0
}
fn default_medium_weight() -> f64 {
    2.0
}
fn default_low_weight() -> f64 {
    1.0
}

/// Decision engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Metric weights
    #[serde(default)]
    pub metric_weights: MetricWeights,
    /// Tier weights
    #[serde(default)]
    pub tier_weights: TierWeights,
    /// Share of the weighted tally a variant needs to be recommended overall
    #[serde(default = "default_majority_threshold")]
    pub majority_threshold: f64,
    /// Non-performance considerations listed when evidence is insufficient
    #[serde(default = "default_decision_factors")]
    pub decision_factors: Vec<String>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            metric_weights: MetricWeights::default(),
            tier_weights: TierWeights::default(),
            majority_threshold: default_majority_threshold(),
            decision_factors: default_decision_factors(),
        }
    }
}

fn default_majority_threshold() -> f64 {
    0.6
}
fn default_decision_factors() -> Vec<String> {
    vec![
        "team familiarity with each toolchain".to_string(),
        "build complexity and toolchain maturity".to_string(),
        "binary size and startup cost".to_string(),
        "memory management model and pause behaviour".to_string(),
        "ecosystem and library availability".to_string(),
    ]
}

impl DecisionConfig {
    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.majority_threshold > 0.5 && self.majority_threshold <= 1.0) {
            return Err(invalid("majority_threshold", "must lie in (0.5, 1]"));
        }
        let w = &self.metric_weights;
        if w.execution_time < 0.0 || w.memory_usage < 0.0 {
            return Err(invalid("metric_weights", "weights must not be negative"));
        }
        let t = &self.tier_weights;
        if !(t.high >= t.medium && t.medium >= t.low && t.low > 0.0) {
            return Err(invalid(
                "tier_weights",
                "must satisfy high >= medium >= low > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.retry.max_attempts, 3);
        assert_eq!(config.quality.outlier_iqr_multiplier, 1.5);
        assert_eq!(config.quality.gating_metrics, vec![Metric::ExecutionTime]);
        assert_eq!(config.statistics.significance_alpha, 0.05);
    }

    #[test]
    fn test_variant_cv_override() {
        let mut quality = QualityConfig::default();
        quality.variant_cv.insert(
            VariantId::new("tinygo"),
            CvThresholds {
                max_cv: 0.3,
                extreme_cv: 1.5,
            },
        );
        assert_eq!(quality.cv_thresholds_for(&"tinygo".into()).max_cv, 0.3);
        assert_eq!(quality.cv_thresholds_for(&"rust".into()).max_cv, 0.15);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PipelineConfig::default();
        config.orchestrator.max_concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidConfig {
                field: "max_concurrency",
                ..
            })
        ));

        let mut config = PipelineConfig::default();
        config.statistics.significance_alpha = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.quality.cv.extreme_cv = 0.1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.validation.allow_list.insert(
            "matrix_mul".into(),
            vec![AllowedDigest {
                digest: 7,
                reason: " ".into(),
            }],
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_defaults_fill_missing_sections() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"quality": {"min_valid_samples": 12}}"#).unwrap();
        assert_eq!(config.quality.min_valid_samples, 12);
        assert_eq!(config.quality.min_iqr_samples, 4);
        assert_eq!(config.orchestrator.max_concurrency, 4);
    }
}
