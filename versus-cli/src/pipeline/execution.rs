//! Orchestrated Execution
//!
//! Builds the runner pool described by `[runner]` and drives the plan through
//! the orchestrator, with a progress bar and Ctrl-C wired to the run's
//! cancellation token.

use crate::config::RunnerConfig;
use crate::runner::CommandRunner;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::warn;
use versus_core::{
    BenchmarkPlan, Cell, CellOutcome, CellStatus, ExecutionObserver, ExecutionReport,
    Orchestrator, OrchestratorConfig, Runner, RunnerPool, Sample,
};

/// Progress bar advancing once per finished cell
pub struct ProgressObserver {
    pb: ProgressBar,
}

impl ProgressObserver {
    /// Bar sized for `cells` cells
    pub fn new(cells: usize) -> Self {
        let pb = ProgressBar::new(cells as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { pb }
    }

    /// Observer that draws nothing
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }

    /// Remove the bar from the terminal
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ExecutionObserver for ProgressObserver {
    fn cell_started(&self, cell: &Cell) {
        self.pb.set_message(cell.to_string());
    }

    fn sample_recorded(&self, sample: &Sample) {
        if let Some(reason) = &sample.failure_reason {
            self.pb.println(format!(
                "  ✗ {} trial {}: {}",
                sample.cell, sample.trial, reason
            ));
        }
    }

    fn cell_finished(&self, outcome: &CellOutcome) {
        if outcome.status == CellStatus::Skipped {
            self.pb.println(format!("  ⊘ {} skipped", outcome.cell));
        }
        self.pb.inc(1);
    }
}

/// Pool of `pool_size` command runners
pub fn build_pool(config: &RunnerConfig) -> anyhow::Result<RunnerPool> {
    let program = config
        .program
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("runner.program must be set in versus.toml to run trials"))?;
    if config.pool_size == 0 {
        return Err(anyhow::anyhow!("runner.pool_size must be at least 1"));
    }
    Ok(RunnerPool::from_factory(config.pool_size, |i| {
        Arc::new(CommandRunner::new(
            format!("cmd-{}", i),
            program,
            config.args.clone(),
        )) as Arc<dyn Runner>
    }))
}

/// Run every cell of `plan` on `pool`
pub async fn execute_plan(
    plan: &BenchmarkPlan,
    config: OrchestratorConfig,
    pool: &RunnerPool,
    show_progress: bool,
) -> anyhow::Result<ExecutionReport> {
    let observer = Arc::new(if show_progress {
        ProgressObserver::new(plan.cells().len())
    } else {
        ProgressObserver::hidden()
    });
    let mut orchestrator = Orchestrator::new(config)?.with_observer(observer.clone());

    let token = orchestrator.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            token.cancel("interrupted by user");
        }
    });

    let result = orchestrator.execute(plan, pool).await;
    interrupt.abort();
    observer.finish();
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use versus_core::{SchedulingMode, Scale, TaskSpec, VariantPair};

    #[test]
    fn test_build_pool_requires_program() {
        let err = build_pool(&RunnerConfig::default()).unwrap_err();
        assert!(err.to_string().contains("runner.program"));

        let config = RunnerConfig {
            program: Some("true".to_string()),
            args: Vec::new(),
            pool_size: 3,
        };
        assert_eq!(build_pool(&config).unwrap().len(), 3);

        let empty = RunnerConfig {
            pool_size: 0,
            ..config
        };
        assert!(build_pool(&empty).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_plan_with_shell_harness() {
        let script = r#"echo "{\"success\": true, \"executionTime\": 2.0, \"memoryUsed\": 64, \"resultHash\": 1}""#;
        let pool = build_pool(&RunnerConfig {
            program: Some("sh".to_string()),
            args: vec!["-c".to_string(), script.to_string(), "harness".to_string()],
            pool_size: 2,
        })
        .unwrap();
        let plan = BenchmarkPlan::new(
            VariantPair::new("rust", "go"),
            vec![TaskSpec::new("sort", [Scale::Small])],
            3,
        );
        let config = OrchestratorConfig {
            scheduling: SchedulingMode::Sequential,
            ..OrchestratorConfig::default()
        };

        let report = execute_plan(&plan, config, &pool, false).await.unwrap();
        assert_eq!(report.samples.len(), 6);
        assert!(report.samples.iter().all(|s| s.success && s.result_digest == Some(1)));
        assert_eq!(report.failed_samples(), 0);
    }
}
