//! Data Model
//!
//! Identity and measurement types that flow through the whole pipeline.
//! Samples are created once by the orchestrator and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Input size class of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Smallest workload
    Small,
    /// Intermediate workload
    Medium,
    /// Largest workload
    Large,
}

impl Scale {
    /// All scales in ascending order
    pub const ALL: [Scale; 3] = [Scale::Small, Scale::Medium, Scale::Large];

    /// Lowercase name used on the wire and in reports
    pub fn as_str(self) -> &'static str {
        match self {
            Scale::Small => "small",
            Scale::Medium => "medium",
            Scale::Large => "large",
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scale {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(Scale::Small),
            "medium" => Ok(Scale::Medium),
            "large" => Ok(Scale::Large),
            other => Err(ValidationError::UnknownScale(other.to_string())),
        }
    }
}

/// Name of one implementation under comparison
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(String);

impl VariantId {
    /// Create a variant identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VariantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The two variants a run compares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPair {
    /// First variant (group 1 in every comparison)
    pub a: VariantId,
    /// Second variant (group 2 in every comparison)
    pub b: VariantId,
}

impl VariantPair {
    /// Build a pair from two identifiers
    pub fn new(a: impl Into<VariantId>, b: impl Into<VariantId>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }

    /// Both variants in declaration order
    pub fn both(&self) -> [&VariantId; 2] {
        [&self.a, &self.b]
    }

    /// Whether the variant is part of this pair
    pub fn contains(&self, variant: &VariantId) -> bool {
        &self.a == variant || &self.b == variant
    }

    /// The same pair with `a` and `b` exchanged
    pub fn swapped(&self) -> Self {
        Self {
            a: self.b.clone(),
            b: self.a.clone(),
        }
    }
}

/// Unique unit of scheduled work: one task, one variant, one scale
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Task name
    pub task: String,
    /// Variant executing the task
    pub variant: VariantId,
    /// Input size class
    pub scale: Scale,
}

impl Cell {
    /// Construct a cell
    pub fn new(task: impl Into<String>, variant: impl Into<VariantId>, scale: Scale) -> Self {
        Self {
            task: task.into(),
            variant: variant.into(),
            scale,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.task, self.variant, self.scale)
    }
}

/// Measured quantity of a trial. Both metrics are lower-is-better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Wall-clock execution time in milliseconds
    ExecutionTime,
    /// Memory used in bytes
    MemoryUsage,
}

impl Metric {
    /// Every metric, in report order
    pub const ALL: [Metric; 2] = [Metric::ExecutionTime, Metric::MemoryUsage];

    /// Extract this metric from a sample
    pub fn value(self, sample: &Sample) -> f64 {
        match self {
            Metric::ExecutionTime => sample.execution_time_ms,
            Metric::MemoryUsage => sample.memory_used_bytes as f64,
        }
    }

    /// Display unit
    pub fn unit(self) -> &'static str {
        match self {
            Metric::ExecutionTime => "ms",
            Metric::MemoryUsage => "bytes",
        }
    }

    /// Whether smaller values are better
    pub fn lower_is_better(self) -> bool {
        true
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::ExecutionTime => write!(f, "execution_time"),
            Metric::MemoryUsage => write!(f, "memory_usage"),
        }
    }
}

/// Why a trial did not produce a usable measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The trial did not finish within its timeout
    Timeout,
    /// The runner reported a failed execution
    ExecutionFailure(String),
    /// The runner rejected the request as malformed; never retried
    InvalidInput(String),
    /// No runner context became available in time
    ResourceExhaustion,
    /// The connection handshake with a runner context failed
    ConnectionFailure(String),
    /// The run was cancelled while the trial was in flight
    Cancelled,
}

impl FailureReason {
    /// Whether a trial failing for this reason may be attempted again
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FailureReason::InvalidInput(_) | FailureReason::Cancelled
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::ExecutionFailure(msg) => write!(f, "execution failure: {}", msg),
            FailureReason::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            FailureReason::ResourceExhaustion => write!(f, "resource exhaustion"),
            FailureReason::ConnectionFailure(msg) => write!(f, "connection failure: {}", msg),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one trial of one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Cell the trial belongs to
    pub cell: Cell,
    /// Zero-based trial index within the cell
    pub trial: u32,
    /// Attempts spent on this trial (1 when no retry happened)
    pub attempts: u32,
    /// Whether the trial produced a measurement
    pub success: bool,
    /// Execution time in milliseconds (0 for failed trials)
    pub execution_time_ms: f64,
    /// Memory used in bytes (0 for failed trials)
    pub memory_used_bytes: u64,
    /// Digest of the trial's result bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_digest: Option<u32>,
    /// Failure reason for unsuccessful trials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl Sample {
    /// A successful measurement
    pub fn succeeded(
        cell: Cell,
        trial: u32,
        attempts: u32,
        execution_time_ms: f64,
        memory_used_bytes: u64,
        result_digest: Option<u32>,
    ) -> Self {
        Self {
            cell,
            trial,
            attempts,
            success: true,
            execution_time_ms,
            memory_used_bytes,
            result_digest,
            failure_reason: None,
        }
    }

    /// A failed trial
    pub fn failed(cell: Cell, trial: u32, attempts: u32, reason: FailureReason) -> Self {
        Self {
            cell,
            trial,
            attempts,
            success: false,
            execution_time_ms: 0.0,
            memory_used_bytes: 0,
            result_digest: None,
            failure_reason: Some(reason),
        }
    }
}

/// Workload weight of a task, selecting the trial timeout tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workload {
    /// Uses the execution timeout
    #[default]
    Standard,
    /// Uses the heavy-workload timeout
    Heavy,
}

/// One task of a benchmark plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, unique within the plan
    pub name: String,
    /// Scales to run
    pub scales: Vec<Scale>,
    /// Workload tier
    #[serde(default)]
    pub workload: Workload,
    /// Opaque parameters forwarded to the runner
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TaskSpec {
    /// A standard-workload task running at the given scales
    pub fn new(name: impl Into<String>, scales: impl IntoIterator<Item = Scale>) -> Self {
        Self {
            name: name.into(),
            scales: scales.into_iter().collect(),
            workload: Workload::Standard,
            params: BTreeMap::new(),
        }
    }

    /// Mark the task as heavy
    pub fn heavy(mut self) -> Self {
        self.workload = Workload::Heavy;
        self
    }

    /// Attach a runner parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Everything the orchestrator needs to know about what to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPlan {
    /// Variants under comparison
    pub variants: VariantPair,
    /// Tasks in execution order
    pub tasks: Vec<TaskSpec>,
    /// Trials per cell
    pub repetitions: u32,
}

impl BenchmarkPlan {
    /// Build a plan
    pub fn new(variants: VariantPair, tasks: Vec<TaskSpec>, repetitions: u32) -> Self {
        Self {
            variants,
            tasks,
            repetitions,
        }
    }

    /// Expand to cells in deterministic order: task, then scale, then variant
    pub fn cells(&self) -> Vec<Cell> {
        self.cells_with_tasks()
            .into_iter()
            .map(|(cell, _)| cell)
            .collect()
    }

    /// Expand to cells paired with their task definition
    pub fn cells_with_tasks(&self) -> Vec<(Cell, &TaskSpec)> {
        let mut cells = Vec::new();
        for task in &self.tasks {
            let scales: BTreeSet<Scale> = task.scales.iter().copied().collect();
            for scale in scales {
                for variant in self.variants.both() {
                    cells.push((Cell::new(task.name.clone(), variant.clone(), scale), task));
                }
            }
        }
        cells
    }

    /// Look up a task by name
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Total number of trials the plan schedules
    pub fn total_trials(&self) -> usize {
        self.cells().len() * self.repetitions as usize
    }

    /// Reject malformed plans before anything executes
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.variants.a.as_str().is_empty() || self.variants.b.as_str().is_empty() {
            return Err(ValidationError::EmptyName("variant"));
        }
        if self.variants.a == self.variants.b {
            return Err(ValidationError::IdenticalVariants(
                self.variants.a.to_string(),
            ));
        }
        if self.tasks.is_empty() {
            return Err(ValidationError::EmptyPlan);
        }
        if self.repetitions == 0 {
            return Err(ValidationError::ZeroRepetitions);
        }

        let mut seen = BTreeSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                return Err(ValidationError::EmptyName("task"));
            }
            if !seen.insert(task.name.as_str()) {
                return Err(ValidationError::DuplicateTask(task.name.clone()));
            }
            if task.scales.is_empty() {
                return Err(ValidationError::NoScales(task.name.clone()));
            }
        }
        Ok(())
    }
}

/// Malformed plan or configuration, reported before execution starts
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Plan contains no tasks
    #[error("plan contains no tasks")]
    EmptyPlan,
    /// Repetition count is zero
    #[error("repetitions must be at least 1")]
    ZeroRepetitions,
    /// Both variants carry the same name
    #[error("both variants are named '{0}'")]
    IdenticalVariants(String),
    /// A required name is empty
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),
    /// Two tasks share a name
    #[error("duplicate task '{0}'")]
    DuplicateTask(String),
    /// A task lists no scales
    #[error("task '{0}' has no scales")]
    NoScales(String),
    /// Unrecognized scale name
    #[error("unknown scale '{0}' (expected small, medium or large)")]
    UnknownScale(String),
    /// A configuration value is out of range
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> BenchmarkPlan {
        BenchmarkPlan::new(
            VariantPair::new("rust", "tinygo"),
            vec![
                TaskSpec::new("mandelbrot", [Scale::Large, Scale::Small]),
                TaskSpec::new("json_parse", [Scale::Medium]).heavy(),
            ],
            10,
        )
    }

    #[test]
    fn test_cells_deterministic_order() {
        let cells = plan().cells();
        let rendered: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "mandelbrot/rust/small",
                "mandelbrot/tinygo/small",
                "mandelbrot/rust/large",
                "mandelbrot/tinygo/large",
                "json_parse/rust/medium",
                "json_parse/tinygo/medium",
            ]
        );
        assert_eq!(plan().total_trials(), 60);
    }

    #[test]
    fn test_validate_rejects_malformed_plans() {
        assert!(plan().validate().is_ok());

        let mut p = plan();
        p.repetitions = 0;
        assert_eq!(p.validate(), Err(ValidationError::ZeroRepetitions));

        let mut p = plan();
        p.tasks.push(TaskSpec::new("mandelbrot", [Scale::Small]));
        assert_eq!(
            p.validate(),
            Err(ValidationError::DuplicateTask("mandelbrot".into()))
        );

        let mut p = plan();
        p.variants = VariantPair::new("rust", "rust");
        assert!(matches!(
            p.validate(),
            Err(ValidationError::IdenticalVariants(_))
        ));

        let mut p = plan();
        p.tasks[0].scales.clear();
        assert!(matches!(p.validate(), Err(ValidationError::NoScales(_))));

        let mut p = plan();
        p.tasks.clear();
        assert_eq!(p.validate(), Err(ValidationError::EmptyPlan));
    }

    #[test]
    fn test_failure_reason_retryable() {
        assert!(FailureReason::Timeout.is_retryable());
        assert!(FailureReason::ExecutionFailure("boom".into()).is_retryable());
        assert!(FailureReason::ResourceExhaustion.is_retryable());
        assert!(!FailureReason::InvalidInput("bad".into()).is_retryable());
        assert!(!FailureReason::Cancelled.is_retryable());
    }

    #[test]
    fn test_scale_parse_and_order() {
        assert_eq!("Medium".parse::<Scale>().unwrap(), Scale::Medium);
        assert!("huge".parse::<Scale>().is_err());
        assert!(Scale::Small < Scale::Large);
    }

    #[test]
    fn test_sample_json_shape() {
        let sample = Sample::failed(
            Cell::new("sort", "rust", Scale::Small),
            3,
            2,
            FailureReason::ExecutionFailure("trap".into()),
        );
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["cell"]["scale"], "small");
        assert_eq!(json["failure_reason"]["kind"], "execution_failure");
        assert!(json.get("result_digest").is_none());

        let back: Sample = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample);
    }
}
