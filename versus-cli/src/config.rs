//! Configuration loading from versus.toml
//!
//! A `versus.toml` file describes the plan (variants and tasks), how trials are
//! launched, and every tunable of the analysis pipeline. It is discovered by
//! walking up from the current directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use versus_core::{
    BenchmarkPlan, DecisionConfig, OrchestratorConfig, PipelineConfig, QualityConfig, RetryConfig,
    Scale, SchedulingMode, StatisticsConfig, TaskSpec, TimeoutConfig, TimeoutMultipliers,
    ValidationConfig, VariantPair, Workload,
};

/// Versus configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VersusConfig {
    /// What to run
    #[serde(default)]
    pub plan: PlanConfig,
    /// How trials are launched
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Scheduling, timeouts and retries
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    /// Outlier removal and group classification
    #[serde(default)]
    pub quality: QualityConfig,
    /// Hypothesis testing
    #[serde(default)]
    pub statistics: StatisticsConfig,
    /// Digest validation
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Recommendation aggregation
    #[serde(default)]
    pub decision: DecisionConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Variants and tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Exactly two variant names, `[a, b]`
    #[serde(default = "default_variants")]
    pub variants: Vec<String>,
    /// Trials per cell
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    /// Tasks in execution order
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            repetitions: default_repetitions(),
            tasks: Vec::new(),
        }
    }
}

fn default_variants() -> Vec<String> {
    vec!["a".to_string(), "b".to_string()]
}
fn default_repetitions() -> u32 {
    30
}

/// One `[[plan.tasks]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name
    pub name: String,
    /// Scales to run: "small", "medium", "large"
    #[serde(default = "default_scales")]
    pub scales: Vec<Scale>,
    /// "standard" or "heavy"
    #[serde(default)]
    pub workload: Workload,
    /// Parameters forwarded to the runner
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_scales() -> Vec<Scale> {
    Scale::ALL.to_vec()
}

/// How the command runner launches a trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Program to spawn for every trial
    #[serde(default)]
    pub program: Option<String>,
    /// Arguments placed before the generated trial arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Number of runner contexts
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_pool_size() -> usize {
    4
}

/// Orchestrator settings with human-readable durations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    /// Base timeout every category derives from (e.g., "30s")
    #[serde(default = "default_base_timeout")]
    pub base_timeout: String,
    /// Per-category timeout multipliers
    #[serde(default)]
    pub multipliers: TimeoutMultipliers,
    /// Scale every timeout down for fast feedback
    #[serde(default)]
    pub quick_mode: bool,
    /// "sequential" or "parallel"
    #[serde(default)]
    pub scheduling: SchedulingMode,
    /// Maximum cells in flight
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Attempts per trial, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay (e.g., "200ms")
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: String,
    /// Cap on any retry delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,
    /// Growth factor between retry delays
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Relative jitter applied to retry delays
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Failure rate that aborts the run
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Trials to complete before the failure rate counts
    #[serde(default = "default_min_trials_before_abort")]
    pub min_trials_before_abort: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            base_timeout: default_base_timeout(),
            multipliers: TimeoutMultipliers::default(),
            quick_mode: false,
            scheduling: SchedulingMode::default(),
            max_concurrency: default_max_concurrency(),
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            failure_threshold: default_failure_threshold(),
            min_trials_before_abort: default_min_trials_before_abort(),
        }
    }
}

fn default_base_timeout() -> String {
    "30s".to_string()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> String {
    "200ms".to_string()
}
fn default_max_backoff() -> String {
    "5s".to_string()
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}
fn default_failure_threshold() -> f64 {
    0.1
}
fn default_min_trials_before_abort() -> usize {
    5
}

impl OrchestratorSection {
    /// Convert to the core value object, parsing durations
    pub fn to_core(&self) -> anyhow::Result<OrchestratorConfig> {
        let defaults = TimeoutConfig::default();
        Ok(OrchestratorConfig {
            timeouts: TimeoutConfig {
                base_timeout: parse_std_duration(&self.base_timeout)?,
                multipliers: self.multipliers,
                quick_mode: self.quick_mode,
                quick_mode_factor: defaults.quick_mode_factor,
            },
            scheduling: self.scheduling,
            max_concurrency: self.max_concurrency,
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                initial_backoff: parse_std_duration(&self.initial_backoff)?,
                max_backoff: parse_std_duration(&self.max_backoff)?,
                backoff_multiplier: self.backoff_multiplier,
                jitter: self.jitter,
            },
            failure_threshold: self.failure_threshold,
            min_trials_before_abort: self.min_trials_before_abort,
        })
    }
}

fn parse_std_duration(s: &str) -> anyhow::Result<Duration> {
    Ok(Duration::from_nanos(VersusConfig::parse_duration(s)?))
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json", "markdown"
    #[serde(default = "default_format")]
    pub format: String,
    /// Save raw samples after each run
    #[serde(default)]
    pub save_samples: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            save_samples: None,
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl VersusConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("versus.toml");
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!(path = %config_path.display(), error = %e, "ignoring unreadable config");
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Validated pipeline configuration
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let config = PipelineConfig {
            orchestrator: self.orchestrator.to_core()?,
            quality: self.quality.clone(),
            statistics: self.statistics,
            validation: self.validation.clone(),
            decision: self.decision.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Variants named in `[plan]`
    pub fn variants(&self) -> anyhow::Result<VariantPair> {
        match self.plan.variants.as_slice() {
            [a, b] => Ok(VariantPair::new(a.as_str(), b.as_str())),
            other => Err(anyhow::anyhow!(
                "plan.variants must name exactly two variants, found {}",
                other.len()
            )),
        }
    }

    /// Validated benchmark plan
    pub fn plan(&self) -> anyhow::Result<BenchmarkPlan> {
        let tasks = self
            .plan
            .tasks
            .iter()
            .map(|t| TaskSpec {
                name: t.name.clone(),
                scales: t.scales.clone(),
                workload: t.workload,
                params: t.params.clone(),
            })
            .collect();
        let plan = BenchmarkPlan::new(self.variants()?, tasks, self.plan.repetitions);
        plan.validate()?;
        Ok(plan)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Versus Configuration

[plan]
# The two implementations under comparison
variants = ["rust", "go"]
# Trials per (task, variant, scale) cell
repetitions = 30

[[plan.tasks]]
name = "sort"
scales = ["small", "medium", "large"]

[[plan.tasks]]
name = "matrix_multiply"
scales = ["small", "medium"]
# Heavy tasks get the longer trial timeout
workload = "heavy"
params = { seed = "42" }

[runner]
# Program spawned for every trial; receives --task --variant --scale --trial
# program = "./bench-harness"
# args = ["--json"]
# Number of runner contexts
pool_size = 4

[orchestrator]
# Base timeout every other timeout derives from
base_timeout = "30s"
# Scale every timeout by 0.1 for fast feedback
quick_mode = false
# "sequential" or "parallel"
scheduling = "parallel"
max_concurrency = 4
# Attempts per trial, including the first
max_attempts = 3
initial_backoff = "200ms"
max_backoff = "5s"
backoff_multiplier = 2.0
jitter = 0.1
# Abort when more than this share of trials fails
failure_threshold = 0.1
min_trials_before_abort = 5

[orchestrator.multipliers]
connection = 2.0
execution = 2.5
resource_wait = 0.25
heavy_workload = 3.0

[quality]
# IQR multiplier for outlier bounds
outlier_iqr_multiplier = 1.5
min_iqr_samples = 4
min_valid_samples = 10
min_success_rate = 0.8
# Metrics whose stability decides a group's level
gating_metrics = ["execution_time"]
invalid_group_fraction = 0.1
warning_group_fraction = 0.2

[quality.cv]
max_cv = 0.15
extreme_cv = 1.0

# Per-variant override (uncomment to enable)
# [quality.variant_cv.go]
# max_cv = 0.25
# extreme_cv = 1.0

[statistics]
significance_alpha = 0.05
confidence_level = 0.95
minimum_detectable_effect = 0.5
power = 0.8
min_samples = 5

[statistics.effect_size_thresholds]
small = 0.2
medium = 0.5
large = 0.8

[validation]
# Variant whose digests are the reference (defaults to the first variant)
# trusted_variant = "rust"

# Extra accepted digests per task, each with an audit reason (uncomment to enable)
# [[validation.allow_list.matrix_multiply]]
# digest = 0x1234abcd
# reason = "fused multiply-add changes the last rounding step"

[decision]
# Share of the weighted tally needed for an overall recommendation
majority_threshold = 0.6

[decision.metric_weights]
execution_time = 1.0
memory_usage = 0.5

[decision.tier_weights]
high = 3.0
medium = 2.0
low = 1.0

[output]
# Default output format: human, json, markdown
format = "human"
# Save raw samples after each run (uncomment to enable)
# save_samples = "target/versus/samples.json"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if value < 0.0 {
            return Err(anyhow::anyhow!("Negative duration: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use versus_core::Metric;

    #[test]
    fn test_default_config() {
        let config = VersusConfig::default();
        assert_eq!(config.plan.repetitions, 30);
        assert_eq!(config.orchestrator.base_timeout, "30s");
        assert_eq!(config.output.format, "human");
        assert!(config.runner.program.is_none());
        assert!(config.pipeline_config().is_ok());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(VersusConfig::parse_duration("3s").unwrap(), 3_000_000_000);
        assert_eq!(VersusConfig::parse_duration("500ms").unwrap(), 500_000_000);
        assert_eq!(VersusConfig::parse_duration("100us").unwrap(), 100_000);
        assert_eq!(VersusConfig::parse_duration("1000ns").unwrap(), 1000);
        assert_eq!(VersusConfig::parse_duration("2m").unwrap(), 120_000_000_000);
        assert_eq!(VersusConfig::parse_duration("1.5s").unwrap(), 1_500_000_000);
        assert_eq!(VersusConfig::parse_duration("10").unwrap(), 10_000_000_000);
        assert!(VersusConfig::parse_duration("").is_err());
        assert!(VersusConfig::parse_duration("5 parsecs").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [plan]
            variants = ["rust", "go"]
            repetitions = 12

            [[plan.tasks]]
            name = "sort"
            scales = ["small"]

            [orchestrator]
            base_timeout = "2s"
            scheduling = "sequential"

            [quality]
            min_valid_samples = 8
        "#;

        let config: VersusConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.plan.repetitions, 12);
        assert_eq!(config.quality.min_valid_samples, 8);
        // Defaults should still apply
        assert_eq!(config.quality.gating_metrics, vec![Metric::ExecutionTime]);
        assert_eq!(config.output.format, "human");

        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(
            pipeline.orchestrator.timeouts.base_timeout,
            Duration::from_secs(2)
        );
        assert_eq!(pipeline.orchestrator.scheduling, SchedulingMode::Sequential);

        let plan = config.plan().unwrap();
        assert_eq!(plan.variants, VariantPair::new("rust", "go"));
        assert_eq!(plan.cells().len(), 2);
    }

    #[test]
    fn test_default_toml_parses() {
        let default_toml = VersusConfig::default_toml();
        let config: VersusConfig = toml::from_str(&default_toml).unwrap();
        assert_eq!(config.plan.variants, vec!["rust", "go"]);
        assert_eq!(config.plan.tasks.len(), 2);
        assert_eq!(config.plan.tasks[1].workload, Workload::Heavy);
        assert!(config.pipeline_config().is_ok());
        assert!(config.plan().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = VersusConfig::default();
        config.plan.variants = vec!["only".to_string()];
        assert!(config.variants().is_err());

        let mut config = VersusConfig::default();
        config.orchestrator.base_timeout = "soon".to_string();
        assert!(config.pipeline_config().is_err());

        let mut config = VersusConfig::default();
        config.decision.majority_threshold = 0.3;
        assert!(config.pipeline_config().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versus.toml");
        std::fs::write(&path, VersusConfig::default_toml()).unwrap();
        let config = VersusConfig::load(&path).unwrap();
        assert_eq!(config.runner.pool_size, 4);
    }
}
