//! Orchestrator
//!
//! Drives a [`BenchmarkPlan`] against a [`RunnerPool`].
//!
//! ## Per-cell lifecycle
//!
//! ```text
//! checkout context ──(resource-wait timeout)──► ResourceExhaustion
//!       │
//!       ▼
//! connect ──(connection timeout, retried)──► ConnectionFailure
//!       │
//!       ▼
//! for each trial:
//!     retry { execute ⟷ trial timeout ⟷ cancellation }
//!     record Sample ──► failure rate > threshold? ──► FatalAbort
//!       │
//!       ▼
//! context returned to pool (guard drop)
//! ```
//!
//! Sequential mode runs cells in plan order. Parallel mode keeps a sliding
//! window of at most `max_concurrency` cells in flight on a single task, so
//! samples are recorded in completion order. Once the run is cancelled no new
//! cell starts; remaining cells are reported as skipped and every context is
//! aborted and released on a best-effort basis.

use crate::cancel::CancellationToken;
use crate::collector::SampleCollector;
use crate::config::{OrchestratorConfig, SchedulingMode};
use crate::model::{BenchmarkPlan, Cell, FailureReason, Sample, TaskSpec, ValidationError};
use crate::pool::{CleanupDiagnostic, RunnerPool};
use crate::retry::RetryPolicy;
use crate::runner::{Runner, RunnerError, TrialOutcome, TrialRequest};
use crate::timeout::{OperationCategory, TimeoutPolicy};
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Not started
    Idle,
    /// Executing cells
    Running,
    /// Every cell ran
    Completed,
    /// Stopped early by cancellation or the failure threshold
    Aborted,
}

/// How a cell ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    /// Every trial succeeded
    Completed,
    /// Some trials failed
    Degraded,
    /// Every trial failed, or setup failed
    Failed,
    /// The run was cancelled while the cell was executing
    Interrupted,
    /// The cell never started
    Skipped,
}

/// Summary of one cell's execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellOutcome {
    /// The cell
    pub cell: Cell,
    /// Final status
    pub status: CellStatus,
    /// Trials the plan scheduled
    pub trials_planned: u32,
    /// Samples recorded for this cell
    pub trials_recorded: u32,
    /// Recorded samples that failed
    pub trials_failed: u32,
    /// Setup failure (checkout or connection) that failed every trial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_failure: Option<FailureReason>,
}

impl CellOutcome {
    fn skipped(cell: Cell, planned: u32) -> Self {
        Self {
            cell,
            status: CellStatus::Skipped,
            trials_planned: planned,
            trials_recorded: 0,
            trials_failed: 0,
            setup_failure: None,
        }
    }
}

/// Why and when a run stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatalAbort {
    /// Human-readable cause
    pub reason: String,
    /// Trials recorded when the abort fired
    pub completed_trials: usize,
    /// Failed trials among them
    pub failed_trials: usize,
    /// Failure rate when the abort fired
    pub failure_rate: f64,
}

/// Everything the orchestrator produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Samples in recording order
    pub samples: Vec<Sample>,
    /// One outcome per planned cell
    pub cell_outcomes: Vec<CellOutcome>,
    /// Final state
    pub state: RunState,
    /// Abort details when the run stopped early
    pub abort: Option<FatalAbort>,
    /// Problems met during cleanup
    pub diagnostics: Vec<CleanupDiagnostic>,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl ExecutionReport {
    /// Whether the run stopped early
    pub fn is_aborted(&self) -> bool {
        self.state == RunState::Aborted
    }

    /// Cells that never started
    pub fn skipped_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cell_outcomes
            .iter()
            .filter(|o| o.status == CellStatus::Skipped)
            .map(|o| &o.cell)
    }

    /// Number of failed samples
    pub fn failed_samples(&self) -> usize {
        self.samples.iter().filter(|s| !s.success).count()
    }
}

/// Progress hooks, invoked from the orchestrating task
pub trait ExecutionObserver: Send + Sync {
    /// A cell acquired a runner context
    fn cell_started(&self, _cell: &Cell) {}
    /// A sample is about to be recorded
    fn sample_recorded(&self, _sample: &Sample) {}
    /// A cell finished or was skipped
    fn cell_finished(&self, _outcome: &CellOutcome) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Errors that prevent a run from starting
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Plan or configuration rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No runner contexts to execute on
    #[error("runner pool is empty")]
    EmptyPool,
    /// `execute` called on an orchestrator that already ran
    #[error("orchestrator cannot start from state {0:?}")]
    InvalidState(RunState),
}

/// Schedules cells against runner contexts
pub struct Orchestrator {
    config: OrchestratorConfig,
    timeouts: TimeoutPolicy,
    retry: RetryPolicy,
    cancel: CancellationToken,
    state: RunState,
    observer: Arc<dyn ExecutionObserver>,
}

impl Orchestrator {
    /// Create an idle orchestrator from validated settings
    pub fn new(config: OrchestratorConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            timeouts: TimeoutPolicy::new(config.timeouts),
            retry: RetryPolicy::from_config(&config.retry),
            config,
            cancel: CancellationToken::new(),
            state: RunState::Idle,
            observer: Arc::new(NoopObserver),
        })
    }

    /// Replace the retry policy derived from configuration
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Install a progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Token that cancels this orchestrator's run when flipped
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Timeout policy in effect
    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    /// Execute every cell of `plan`.
    ///
    /// Trial-level problems never surface as `Err`; they end up as failed
    /// samples, cell outcomes, an abort record or cleanup diagnostics.
    pub async fn execute(
        &mut self,
        plan: &BenchmarkPlan,
        pool: &RunnerPool,
    ) -> Result<ExecutionReport, OrchestratorError> {
        if self.state != RunState::Idle {
            return Err(OrchestratorError::InvalidState(self.state));
        }
        plan.validate()?;
        if pool.is_empty() {
            return Err(OrchestratorError::EmptyPool);
        }

        self.state = RunState::Running;
        let started = Instant::now();
        let cells = plan.cells_with_tasks();
        info!(
            cells = cells.len(),
            trials = plan.total_trials(),
            mode = ?self.config.scheduling,
            quick = self.timeouts.is_quick(),
            "starting benchmark run"
        );

        let collector = SampleCollector::new();
        let fatal = OnceLock::new();
        let run = CellRun {
            plan,
            pool,
            config: &self.config,
            timeouts: &self.timeouts,
            retry: &self.retry,
            cancel: &self.cancel,
            collector: &collector,
            observer: self.observer.as_ref(),
            fatal: &fatal,
        };

        let cell_outcomes = match self.config.scheduling {
            SchedulingMode::Sequential => run.sequential(cells).await,
            SchedulingMode::Parallel => {
                let window = self.config.max_concurrency.min(pool.len()).max(1);
                run.parallel(cells, window).await
            }
        };

        let cleanup_wait = self.timeouts.timeout_for(OperationCategory::ResourceWait);
        let aborted = self.cancel.is_cancelled();
        let mut diagnostics = Vec::new();
        if aborted {
            diagnostics.extend(pool.abort_all(cleanup_wait).await);
        }
        diagnostics.extend(pool.release_all(cleanup_wait).await);

        let tally = collector.tally();
        let abort = fatal.into_inner().or_else(|| {
            aborted.then(|| FatalAbort {
                reason: self
                    .cancel
                    .reason()
                    .unwrap_or("cancelled")
                    .to_string(),
                completed_trials: tally.completed,
                failed_trials: tally.failed,
                failure_rate: tally.failure_rate(),
            })
        });

        self.state = if aborted {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        let elapsed = started.elapsed();
        info!(
            state = ?self.state,
            samples = tally.completed,
            failed = tally.failed,
            ?elapsed,
            "benchmark run finished"
        );

        Ok(ExecutionReport {
            samples: collector.into_samples(),
            cell_outcomes,
            state: self.state,
            abort,
            diagnostics,
            elapsed,
        })
    }
}

/// Borrowed view of one run's shared state
struct CellRun<'a> {
    plan: &'a BenchmarkPlan,
    pool: &'a RunnerPool,
    config: &'a OrchestratorConfig,
    timeouts: &'a TimeoutPolicy,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationToken,
    collector: &'a SampleCollector,
    observer: &'a dyn ExecutionObserver,
    fatal: &'a OnceLock<FatalAbort>,
}

impl<'a> CellRun<'a> {
    async fn sequential(&self, cells: Vec<(Cell, &'a TaskSpec)>) -> Vec<CellOutcome> {
        let mut outcomes = Vec::with_capacity(cells.len());
        for (cell, task) in cells {
            let outcome = self.run_cell(cell, task).await;
            self.observer.cell_finished(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn parallel(&self, cells: Vec<(Cell, &'a TaskSpec)>, window: usize) -> Vec<CellOutcome> {
        let mut outcomes = Vec::with_capacity(cells.len());
        let mut queue = cells.into_iter();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < window && !self.cancel.is_cancelled() {
                match queue.next() {
                    Some((cell, task)) => in_flight.push(self.run_cell(cell, task)),
                    None => break,
                }
            }
            match in_flight.next().await {
                Some(outcome) => {
                    self.observer.cell_finished(&outcome);
                    outcomes.push(outcome);
                }
                None => break,
            }
        }

        for (cell, _) in queue {
            let outcome = CellOutcome::skipped(cell, self.plan.repetitions);
            self.observer.cell_finished(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_cell(&self, cell: Cell, task: &TaskSpec) -> CellOutcome {
        let planned = self.plan.repetitions;
        if self.cancel.is_cancelled() {
            return CellOutcome::skipped(cell, planned);
        }

        let runner = match self
            .pool
            .checkout(self.timeouts.timeout_for(OperationCategory::ResourceWait))
            .await
        {
            Ok(runner) => runner,
            Err(e) => {
                warn!(%cell, error = %e, "no runner context for cell");
                return self.fail_cell(cell, planned, FailureReason::ResourceExhaustion);
            }
        };
        self.observer.cell_started(&cell);
        debug!(%cell, context = runner.index(), "cell started");

        let ctx: &dyn Runner = &*runner;
        let connect_timeout = self.timeouts.timeout_for(OperationCategory::Connection);
        let connected = self
            .retry
            .run(self.cancel, move |_| async move {
                match tokio::time::timeout(connect_timeout, ctx.connect()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e @ RunnerError::InvalidInput(_))) => Err(e.failure_reason()),
                    Ok(Err(RunnerError::Aborted)) => Err(self.abort_reason()),
                    Ok(Err(e)) => Err(FailureReason::ConnectionFailure(e.to_string())),
                    Err(_) => Err(FailureReason::ConnectionFailure(format!(
                        "handshake timed out after {:?}",
                        connect_timeout
                    ))),
                }
            })
            .await;
        match connected.result {
            Ok(()) => {}
            Err(FailureReason::Cancelled) if self.cancel.is_cancelled() => {
                return CellOutcome {
                    status: CellStatus::Interrupted,
                    ..CellOutcome::skipped(cell, planned)
                };
            }
            Err(reason) => {
                warn!(%cell, attempts = connected.attempts, %reason, "runner connection failed");
                return self.fail_cell(cell, planned, reason);
            }
        }

        let cell_ref = &cell;
        let mut recorded = 0;
        let mut failed = 0;
        let mut interrupted = false;
        for trial in 0..planned {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            let outcome = self
                .retry
                .run(self.cancel, move |attempt| {
                    self.attempt_trial(ctx, cell_ref, task, trial, attempt)
                })
                .await;

            let sample = match outcome.result {
                Ok(o) => Sample::succeeded(
                    cell.clone(),
                    trial,
                    outcome.attempts,
                    o.execution_time_ms,
                    o.memory_used_bytes,
                    o.result_digest,
                ),
                Err(FailureReason::Cancelled) if self.cancel.is_cancelled() => {
                    interrupted = true;
                    break;
                }
                Err(reason) => {
                    warn!(%cell, trial, attempts = outcome.attempts, %reason, "trial failed");
                    failed += 1;
                    Sample::failed(cell.clone(), trial, outcome.attempts, reason)
                }
            };
            recorded += 1;
            self.record(sample);
        }

        let status = if interrupted {
            CellStatus::Interrupted
        } else if failed == recorded {
            CellStatus::Failed
        } else if failed > 0 {
            CellStatus::Degraded
        } else {
            CellStatus::Completed
        };
        debug!(%cell, ?status, recorded, failed, "cell finished");

        CellOutcome {
            cell,
            status,
            trials_planned: planned,
            trials_recorded: recorded,
            trials_failed: failed,
            setup_failure: None,
        }
    }

    /// Record every trial of a cell as failed for a setup-level reason
    fn fail_cell(&self, cell: Cell, planned: u32, reason: FailureReason) -> CellOutcome {
        let mut recorded = 0;
        for trial in 0..planned {
            if self.cancel.is_cancelled() {
                break;
            }
            self.record(Sample::failed(cell.clone(), trial, 0, reason.clone()));
            recorded += 1;
        }
        CellOutcome {
            cell,
            status: if recorded == planned {
                CellStatus::Failed
            } else {
                CellStatus::Interrupted
            },
            trials_planned: planned,
            trials_recorded: recorded,
            trials_failed: recorded,
            setup_failure: Some(reason),
        }
    }

    async fn attempt_trial(
        &self,
        ctx: &dyn Runner,
        cell: &Cell,
        task: &TaskSpec,
        trial: u32,
        attempt: u32,
    ) -> Result<TrialOutcome, FailureReason> {
        let timeout = self.timeouts.trial_timeout(task.workload);
        let request = TrialRequest {
            cell: cell.clone(),
            trial,
            attempt,
            params: task.params.clone(),
            timeout,
            cancel: self.cancel.clone(),
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            res = tokio::time::timeout(timeout, ctx.execute(&request)) => Some(res),
        };

        match result {
            None => {
                self.abort_context(ctx).await;
                Err(FailureReason::Cancelled)
            }
            Some(Err(_)) => {
                warn!(%cell, trial, attempt, ?timeout, "trial timed out");
                self.abort_context(ctx).await;
                Err(FailureReason::Timeout)
            }
            Some(Ok(Err(RunnerError::Aborted))) => Err(self.abort_reason()),
            Some(Ok(Err(e))) => Err(e.failure_reason()),
            Some(Ok(Ok(outcome))) if !outcome.success => Err(FailureReason::ExecutionFailure(
                outcome
                    .message
                    .unwrap_or_else(|| "runner reported failure".to_string()),
            )),
            Some(Ok(Ok(outcome))) => Ok(outcome),
        }
    }

    /// A runner-side abort only counts as cancellation when this run asked for it
    fn abort_reason(&self) -> FailureReason {
        if self.cancel.is_cancelled() {
            FailureReason::Cancelled
        } else {
            FailureReason::ExecutionFailure("runner aborted without a cancellation request".into())
        }
    }

    async fn abort_context(&self, ctx: &dyn Runner) {
        let wait = self.timeouts.timeout_for(OperationCategory::ResourceWait);
        match tokio::time::timeout(wait, AssertUnwindSafe(ctx.abort()).catch_unwind()).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(runner = ctx.name(), error = %e, "abort failed"),
            Ok(Err(_)) => debug!(runner = ctx.name(), "abort panicked"),
            Err(_) => debug!(runner = ctx.name(), "abort timed out"),
        }
    }

    fn record(&self, sample: Sample) {
        self.observer.sample_recorded(&sample);
        let tally = self.collector.record(sample);
        if tally.completed < self.config.min_trials_before_abort
            || tally.failure_rate() <= self.config.failure_threshold
        {
            return;
        }

        let abort = FatalAbort {
            reason: format!(
                "failure rate {:.1}% over {} trials exceeded threshold {:.1}%",
                tally.failure_rate() * 100.0,
                tally.completed,
                self.config.failure_threshold * 100.0
            ),
            completed_trials: tally.completed,
            failed_trials: tally.failed,
            failure_rate: tally.failure_rate(),
        };
        if self.fatal.set(abort.clone()).is_ok() {
            error!(
                completed = abort.completed_trials,
                failed = abort.failed_trials,
                "aborting run: {}",
                abort.reason
            );
            self.cancel.cancel(abort.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, TimeoutConfig};
    use crate::model::{Scale, TaskSpec, VariantPair};
    use crate::retry::Backoff;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic runner whose behaviour is keyed on the task name
    #[derive(Default)]
    struct ScriptedRunner {
        aborts: AtomicUsize,
        releases: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Runner for ScriptedRunner {
        fn name(&self) -> &str {
            "scripted"
        }

        fn execute<'a>(
            &'a self,
            request: &'a TrialRequest,
        ) -> BoxFuture<'a, Result<TrialOutcome, RunnerError>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                let base = match request.cell.variant.as_str() {
                    "fast" => 10.0,
                    _ => 20.0,
                };
                match request.cell.task.as_str() {
                    "hang" => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        unreachable!()
                    }
                    "broken" => Err(RunnerError::Execution("trap".into())),
                    "abandoned" if request.attempt == 1 => Err(RunnerError::Aborted),
                    "runaway" => Err(RunnerError::Aborted),
                    "invalid" => Err(RunnerError::InvalidInput("bad params".into())),
                    "flaky" if request.attempt == 1 => {
                        Ok(TrialOutcome {
                            success: false,
                            message: Some("transient".into()),
                            ..TrialOutcome::measured(0.0, 0, None)
                        })
                    }
                    _ => {
                        // Jitter in completion order without touching the values
                        tokio::time::sleep(Duration::from_millis((call % 7) as u64)).await;
                        Ok(TrialOutcome::measured(
                            base + request.trial as f64,
                            1024 * (request.cell.scale as u64 + 1),
                            Some(0xC0FFEE),
                        ))
                    }
                }
            })
        }

        fn abort(&self) -> BoxFuture<'_, Result<(), RunnerError>> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn release(&self) -> BoxFuture<'_, Result<(), RunnerError>> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    fn config(scheduling: SchedulingMode, max_concurrency: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            timeouts: TimeoutConfig {
                base_timeout: Duration::from_secs(1),
                ..Default::default()
            },
            scheduling,
            max_concurrency,
            retry: RetryConfig {
                jitter: 0.0,
                ..Default::default()
            },
            failure_threshold: 0.5,
            min_trials_before_abort: 5,
        }
    }

    fn plan(tasks: &[&str], repetitions: u32) -> BenchmarkPlan {
        BenchmarkPlan::new(
            VariantPair::new("fast", "slow"),
            tasks
                .iter()
                .map(|t| TaskSpec::new(*t, [Scale::Small, Scale::Medium]))
                .collect(),
            repetitions,
        )
    }

    fn pool(size: usize) -> (RunnerPool, Vec<Arc<ScriptedRunner>>) {
        let runners: Vec<Arc<ScriptedRunner>> =
            (0..size).map(|_| Arc::new(ScriptedRunner::default())).collect();
        let pool = RunnerPool::new(
            runners
                .iter()
                .map(|r| Arc::clone(r) as Arc<dyn Runner>)
                .collect(),
        );
        (pool, runners)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_preserves_submission_order() {
        let plan = plan(&["sort", "json"], 3);
        let (pool, runners) = pool(1);
        let mut orchestrator = Orchestrator::new(config(SchedulingMode::Sequential, 1)).unwrap();

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(orchestrator.state(), RunState::Completed);
        assert_eq!(report.samples.len(), 24);
        let expected: Vec<(Cell, u32)> = plan
            .cells()
            .into_iter()
            .flat_map(|c| (0..3).map(move |t| (c.clone(), t)))
            .collect();
        let actual: Vec<(Cell, u32)> = report
            .samples
            .iter()
            .map(|s| (s.cell.clone(), s.trial))
            .collect();
        assert_eq!(actual, expected);
        assert!(report.cell_outcomes.iter().all(|o| o.status == CellStatus::Completed));
        assert_eq!(runners[0].releases.load(Ordering::SeqCst), 1);
        assert_eq!(runners[0].aborts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_does_not_change_sample_content() {
        let plan = plan(&["sort", "json", "matrix"], 5);

        let (pool1, _) = pool(1);
        let mut serial = Orchestrator::new(config(SchedulingMode::Parallel, 1)).unwrap();
        let serial = serial.execute(&plan, &pool1).await.unwrap();

        let (pool4, _) = pool(4);
        let mut wide = Orchestrator::new(config(SchedulingMode::Parallel, 4)).unwrap();
        let wide = wide.execute(&plan, &pool4).await.unwrap();

        let key = |s: &Sample| (s.cell.clone(), s.trial);
        let mut a = serial.samples.clone();
        let mut b = wide.samples.clone();
        a.sort_by_key(key);
        b.sort_by_key(key);
        assert_eq!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_records_failure_and_aborts_context() {
        let plan = plan(&["hang"], 1);
        let (pool, runners) = pool(1);
        let mut cfg = config(SchedulingMode::Sequential, 1);
        cfg.failure_threshold = 1.0;
        let mut orchestrator = Orchestrator::new(cfg).unwrap();

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert_eq!(report.samples.len(), 4);
        for sample in &report.samples {
            assert_eq!(sample.failure_reason, Some(FailureReason::Timeout));
            assert_eq!(sample.attempts, 3);
        }
        // One abort per timed-out attempt
        assert_eq!(runners[0].aborts.load(Ordering::SeqCst), 12);
        assert!(report.cell_outcomes.iter().all(|o| o.status == CellStatus::Failed));
        assert_eq!(report.state, RunState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_flaky_trials() {
        let plan = plan(&["flaky"], 2);
        let (pool, _) = pool(2);
        let mut orchestrator = Orchestrator::new(config(SchedulingMode::Parallel, 2)).unwrap();

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert_eq!(report.samples.len(), 8);
        assert!(report.samples.iter().all(|s| s.success && s.attempts == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_is_not_retried() {
        let plan = plan(&["invalid"], 1);
        let (pool, runners) = pool(1);
        let mut cfg = config(SchedulingMode::Sequential, 1);
        cfg.failure_threshold = 1.0;
        let mut orchestrator = Orchestrator::new(cfg).unwrap();

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert!(report.samples.iter().all(|s| s.attempts == 1
            && matches!(s.failure_reason, Some(FailureReason::InvalidInput(_)))));
        assert_eq!(runners[0].calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_threshold_aborts_and_skips_remaining() {
        let plan = plan(&["broken", "sort", "json"], 5);
        let (pool, runners) = pool(1);
        let mut orchestrator = Orchestrator::new(config(SchedulingMode::Sequential, 1))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(
                1,
                Backoff {
                    initial: Duration::ZERO,
                    multiplier: 1.0,
                    max: Duration::ZERO,
                    jitter: 0.0,
                },
            ));

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert!(report.is_aborted());
        let abort = report.abort.as_ref().unwrap();
        assert_eq!(abort.completed_trials, 5);
        assert_eq!(abort.failed_trials, 5);
        assert!(abort.reason.contains("exceeded threshold"));

        assert_eq!(report.samples.len(), 5);
        assert_eq!(report.skipped_cells().count(), 11);
        assert_eq!(report.cell_outcomes.len(), plan.cells().len());
        assert_eq!(runners[0].aborts.load(Ordering::SeqCst), 1);
        assert_eq!(runners[0].releases.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel_stops_hanging_trials() {
        let plan = plan(&["hang"], 3);
        let (pool, _) = pool(2);
        let mut cfg = config(SchedulingMode::Parallel, 2);
        cfg.timeouts.base_timeout = Duration::from_secs(600);
        let mut orchestrator = Orchestrator::new(cfg).unwrap();
        let token = orchestrator.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel("operator interrupt");
        });

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert!(report.is_aborted());
        assert!(report.samples.is_empty());
        assert_eq!(report.abort.unwrap().reason, "operator interrupt");
        assert!(report.elapsed < Duration::from_secs(600));
        let interrupted = report
            .cell_outcomes
            .iter()
            .filter(|o| o.status == CellStatus::Interrupted)
            .count();
        assert_eq!(interrupted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_abort_without_cancel_is_retried() {
        let plan = plan(&["abandoned"], 10);
        let (pool, _) = pool(2);
        let mut orchestrator = Orchestrator::new(config(SchedulingMode::Parallel, 2)).unwrap();

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert!(report.abort.is_none());
        assert_eq!(report.samples.len(), 40);
        assert!(report.samples.iter().all(|s| s.success && s.attempts == 2));
        assert!(report.cell_outcomes.iter().all(|o| o.status == CellStatus::Completed
            && o.trials_recorded == o.trials_planned));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_runner_abort_is_recorded_as_failure() {
        let plan = plan(&["runaway"], 3);
        let (pool, _) = pool(1);
        let mut cfg = config(SchedulingMode::Sequential, 1);
        cfg.failure_threshold = 1.0;
        let mut orchestrator = Orchestrator::new(cfg).unwrap();

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.samples.len(), 12);
        assert!(report.samples.iter().all(|s| s.attempts == 3
            && matches!(s.failure_reason, Some(FailureReason::ExecutionFailure(_)))));
        assert!(report.cell_outcomes.iter().all(|o| o.status == CellStatus::Failed
            && o.trials_recorded == 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_cell_does_not_block_others() {
        let plan = BenchmarkPlan::new(
            VariantPair::new("fast", "slow"),
            vec![
                TaskSpec::new("hang", [Scale::Small]),
                TaskSpec::new("sort", [Scale::Small, Scale::Medium]),
            ],
            3,
        );
        let (pool, _) = pool(3);
        let mut cfg = config(SchedulingMode::Parallel, 3);
        cfg.failure_threshold = 1.0;
        let mut orchestrator = Orchestrator::new(cfg).unwrap();

        let report = orchestrator.execute(&plan, &pool).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.cell_outcomes.len(), 6);
        // Outcomes arrive in completion order: every sort cell ran in the one
        // free slot while both hanging cells were still waiting on timeouts
        let (first, last) = report.cell_outcomes.split_at(4);
        assert!(first.iter().all(|o| o.cell.task == "sort" && o.status == CellStatus::Completed));
        assert!(last.iter().all(|o| o.cell.task == "hang" && o.status == CellStatus::Failed));

        let (hung, normal): (Vec<&Sample>, Vec<&Sample>) =
            report.samples.iter().partition(|s| s.cell.task == "hang");
        assert_eq!(hung.len(), 6);
        assert!(hung.iter().all(|s| s.failure_reason == Some(FailureReason::Timeout)));
        assert_eq!(normal.len(), 12);
        assert!(normal.iter().all(|s| s.success));
    }

    #[tokio::test]
    async fn test_refuses_second_run_and_bad_input() {
        let (pool, _) = pool(1);
        let mut orchestrator = Orchestrator::new(config(SchedulingMode::Sequential, 1)).unwrap();

        let mut bad = plan(&["sort"], 1);
        bad.repetitions = 0;
        assert!(matches!(
            orchestrator.execute(&bad, &pool).await,
            Err(OrchestratorError::Validation(ValidationError::ZeroRepetitions))
        ));

        let empty = RunnerPool::new(Vec::new());
        assert!(matches!(
            orchestrator.execute(&plan(&["sort"], 1), &empty).await,
            Err(OrchestratorError::EmptyPool)
        ));

        orchestrator.execute(&plan(&["sort"], 1), &pool).await.unwrap();
        assert!(matches!(
            orchestrator.execute(&plan(&["sort"], 1), &pool).await,
            Err(OrchestratorError::InvalidState(RunState::Completed))
        ));
    }
}
