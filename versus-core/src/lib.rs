#![warn(missing_docs)]
//! Versus Core - Orchestration Runtime
//!
//! This crate owns everything that happens before analysis starts:
//! - The data model (`Cell`, `Sample`, `BenchmarkPlan`) shared by every stage
//! - Configuration value objects, validated once and passed explicitly
//! - The `Runner` contract through which trials are executed
//! - The `Orchestrator`, which drives a plan against a pool of runner contexts
//!   with bounded concurrency, layered timeouts, retries and failure-threshold abort
//!
//! ## Execution Flow
//!
//! ```text
//! BenchmarkPlan ──► cells (task × scale × variant)
//!                        │
//!                        ▼
//!               ┌─────────────────┐     checkout (resource-wait timeout)
//!               │  Orchestrator   │◄──► RunnerPool ──► Runner contexts
//!               └────────┬────────┘
//!                        │ connect → trial × N (retry + timeout race)
//!                        ▼
//!               ┌─────────────────┐
//!               │ SampleCollector │  append-only, mutex serialized
//!               └────────┬────────┘
//!                        ▼
//!                 ExecutionReport
//! ```

mod cancel;
mod collector;
mod config;
mod model;
mod orchestrator;
mod pool;
mod retry;
mod runner;
mod timeout;

pub use cancel::CancellationToken;
pub use collector::{FailureTally, SampleCollector};
pub use config::{
    AllowedDigest, CvThresholds, DecisionConfig, EffectSizeThresholds, MetricWeights,
    OrchestratorConfig, PipelineConfig, QualityConfig, RetryConfig, SchedulingMode,
    StatisticsConfig, TierWeights, TimeoutConfig, TimeoutMultipliers, ValidationConfig,
};
pub use model::{
    BenchmarkPlan, Cell, FailureReason, Metric, Sample, Scale, TaskSpec, ValidationError,
    VariantId, VariantPair, Workload,
};
pub use orchestrator::{
    CellOutcome, CellStatus, ExecutionObserver, ExecutionReport, FatalAbort, NoopObserver,
    Orchestrator, OrchestratorError, RunState,
};
pub use pool::{CleanupAction, CleanupDiagnostic, PoolError, PooledRunner, RunnerPool};
pub use retry::{Backoff, RetryOutcome, RetryPolicy};
pub use runner::{Runner, RunnerError, TrialOutcome, TrialRequest};
pub use timeout::{OperationCategory, TimeoutPolicy};
