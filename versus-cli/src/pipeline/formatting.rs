//! Output Formatting
//!
//! Human-readable terminal output for pipeline reports.
//!
//! Generates:
//! - Execution summary with abort details and cleanup diagnostics
//! - Per-task comparisons with status icons (✓/✗/⊘)
//! - Validation failures and allow-list usage
//! - Data quality and the data ledger
//! - Per-variant averages and win counts
//! - The overall recommendation with its rationale

use std::collections::BTreeMap;
use versus_core::{CellStatus, Metric};
use versus_logic::ConfidenceTier;
use versus_report::PipelineReport;
use versus_stats::{ComparisonResult, ComparisonStatus, QualityLevel};

fn format_value(metric: Metric, value: f64) -> String {
    match metric {
        Metric::ExecutionTime => format!("{:.3} ms", value),
        Metric::MemoryUsage => format!("{:.1} KiB", value / 1024.0),
    }
}

fn section(output: &mut String, title: &str) {
    output.push_str(&format!("\n{}\n", title));
    output.push_str(&"-".repeat(60));
    output.push('\n');
}

fn format_comparison(output: &mut String, r: &ComparisonResult, alpha: f64) {
    let c = &r.comparison;
    let icon = match c.status {
        ComparisonStatus::Compared if c.is_significant(alpha) => "✓",
        ComparisonStatus::Compared => "·",
        ComparisonStatus::NoVariance => "=",
        ComparisonStatus::InsufficientData => "⊘",
    };
    output.push_str(&format!("  {} {} [{}]\n", icon, r.metric, r.scale));
    output.push_str(&format!(
        "      {}: {} ± {}  (n={})\n",
        r.variants.a,
        format_value(r.metric, c.stats_a.mean),
        format_value(r.metric, c.stats_a.std_dev),
        c.stats_a.n
    ));
    output.push_str(&format!(
        "      {}: {} ± {}  (n={})\n",
        r.variants.b,
        format_value(r.metric, c.stats_b.mean),
        format_value(r.metric, c.stats_b.std_dev),
        c.stats_b.n
    ));

    match c.status {
        ComparisonStatus::InsufficientData => {
            output.push_str("      insufficient data for a comparison\n");
        }
        ComparisonStatus::NoVariance => {
            output.push_str("      no variance in either group: no difference\n");
        }
        ComparisonStatus::Compared => {
            if let Some(welch) = &c.welch {
                output.push_str(&format!(
                    "      t: {:.3}  df: {:.1}  p: {:.4}  {:.0}% CI: [{}, {}]\n",
                    welch.t_statistic,
                    welch.degrees_of_freedom,
                    welch.p_value,
                    welch.confidence_interval.level * 100.0,
                    format_value(r.metric, welch.confidence_interval.lower),
                    format_value(r.metric, welch.confidence_interval.upper)
                ));
            }
            if let Some(effect) = &c.effect {
                output.push_str(&format!(
                    "      d: {:+.3} ({}){}\n",
                    effect.cohens_d,
                    effect.magnitude,
                    if effect.meets_mde { "" } else { ", below MDE" }
                ));
            }
            if let Some(power) = c.power.as_ref().filter(|p| p.underpowered) {
                output.push_str(&format!(
                    "      underpowered: smallest detectable d is {:.2}\n",
                    power.achievable_mde
                ));
            }
        }
    }
}

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &PipelineReport) -> String {
    let mut output = String::new();
    let alpha = report.meta.config.statistics.significance_alpha;

    output.push('\n');
    output.push_str(&format!(
        "Versus Results: {} vs {}\n",
        report.variants.a, report.variants.b
    ));
    output.push_str(&"=".repeat(60));
    output.push('\n');

    if let Some(execution) = &report.execution {
        section(&mut output, "Execution");
        output.push_str(&format!(
            "  state: {:?}  samples: {} ({} failed)  duration: {:.1}s\n",
            execution.state,
            execution.total_samples,
            execution.failed_samples,
            execution.duration_ms / 1000.0
        ));
        if let Some(abort) = &execution.abort {
            output.push_str(&format!(
                "  💥 aborted: {} ({}/{} trials failed, {:.0}%)\n",
                abort.reason,
                abort.failed_trials,
                abort.completed_trials,
                abort.failure_rate * 100.0
            ));
        }
        for outcome in execution
            .cell_outcomes
            .iter()
            .filter(|o| o.status != CellStatus::Completed)
        {
            let icon = match outcome.status {
                CellStatus::Skipped => "⊘",
                _ => "✗",
            };
            let setup = outcome
                .setup_failure
                .as_ref()
                .map(|r| format!(": {}", r))
                .unwrap_or_default();
            output.push_str(&format!(
                "  {} {} {:?} ({}/{} failed){}\n",
                icon,
                outcome.cell,
                outcome.status,
                outcome.trials_failed,
                outcome.trials_recorded,
                setup
            ));
        }
        for d in &execution.diagnostics {
            output.push_str(&format!(
                "  cleanup {:?} on {} #{}: {}\n",
                d.action, d.runner, d.context, d.message
            ));
        }
    }

    let mut by_task: BTreeMap<&str, Vec<&ComparisonResult>> = BTreeMap::new();
    for r in &report.comparisons {
        by_task.entry(&r.task).or_default().push(r);
    }
    for (task, results) in by_task {
        let verdict = report
            .decision
            .task(task)
            .map(|t| match &t.recommendation {
                Some(v) => format!("{} ({})", v, t.tier),
                None => "neutral".to_string(),
            })
            .unwrap_or_else(|| "excluded".to_string());
        section(&mut output, &format!("Task: {} → {}", task, verdict));
        for r in results {
            format_comparison(&mut output, r, alpha);
        }
        if let Some(t) = report.decision.task(task) {
            for v in t.evidence.iter().filter(|v| v.tier != ConfidenceTier::Neutral) {
                output.push_str(&format!("  • {} {}: {}\n", v.scale, v.metric, v.advantage));
            }
        }
    }

    let failed: Vec<_> = report.validations.iter().filter(|v| !v.passed()).collect();
    section(&mut output, "Validation");
    output.push_str(&format!(
        "  {}/{} task/scale pairs produced matching digests\n",
        report.validations.len() - failed.len(),
        report.validations.len()
    ));
    for v in &report.validations {
        for entry in &v.allow_list_used {
            output.push_str(&format!(
                "  ⚠ {} [{}] accepted {:#010x}: {}\n",
                v.task, v.scale, entry.digest, entry.reason
            ));
        }
    }
    for v in failed {
        for failure in &v.failures {
            output.push_str(&format!("  ✗ {} [{}]: {}\n", v.task, v.scale, failure));
        }
    }

    let quality = &report.quality;
    section(&mut output, "Data Quality");
    output.push_str(&format!(
        "  dataset: {}  groups: {}  invalid: {}  warning: {}  outliers removed: {}\n",
        quality.dataset.level,
        quality.dataset.total_groups,
        quality.dataset.invalid_groups,
        quality.dataset.warning_groups,
        quality.outliers_removed
    ));
    for reason in &quality.dataset.reasons {
        output.push_str(&format!("  {}\n", reason));
    }
    for a in quality
        .assessments
        .iter()
        .filter(|a| a.level != QualityLevel::Valid)
    {
        let icon = if a.level == QualityLevel::Invalid {
            "✗"
        } else {
            "⚠"
        };
        output.push_str(&format!("  {} {}: {}\n", icon, a.cell, a.reasons.join("; ")));
    }

    let ledger = &report.ledger;
    output.push_str(&format!(
        "  ledger: {} samples used, {} discarded, {} exclusions\n",
        ledger.used.iter().map(|u| u.samples).sum::<usize>(),
        ledger.discarded.len(),
        ledger.excluded.len()
    ));
    for e in &ledger.excluded {
        let scope = e
            .scale
            .map(|s| format!("{} [{}]", e.task, s))
            .unwrap_or_else(|| e.task.clone());
        output.push_str(&format!("    - {} ({:?}): {}\n", scope, e.stage, e.reason));
    }

    if !report.decision.variant_summaries.is_empty() {
        section(&mut output, "Variants");
        let or_na = |v: Option<String>| v.unwrap_or_else(|| "n/a".to_string());
        for s in &report.decision.variant_summaries {
            output.push_str(&format!(
                "  {}: avg {}, {}, {} success over {} trials, wins {} time / {} memory\n",
                s.variant,
                or_na(s.avg_execution_time_ms.map(|v| format_value(Metric::ExecutionTime, v))),
                or_na(s.avg_memory_bytes.map(|v| format_value(Metric::MemoryUsage, v))),
                or_na(s.success_rate.map(|r| format!("{:.1}%", r * 100.0))),
                s.trials,
                s.execution_wins,
                s.memory_wins
            ));
        }
    }

    let overall = &report.decision.overall;
    section(&mut output, "Recommendation");
    match &overall.recommendation {
        Some(winner) => output.push_str(&format!(
            "  {} (confidence {:.0}%)\n",
            winner,
            overall.confidence_score * 100.0
        )),
        None => output.push_str("  no clear winner\n"),
    }
    output.push_str(&format!("  {}\n", overall.rationale));
    if overall.recommendation.is_none() && !report.decision.decision_factors.is_empty() {
        output.push_str("  consider:\n");
        for factor in &report.decision.decision_factors {
            output.push_str(&format!("    - {}\n", factor));
        }
    }

    output
}
