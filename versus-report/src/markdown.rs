//! Markdown Output
//!
//! A summary suitable for pull request comments or a job summary page.

use crate::report::PipelineReport;
use std::fmt::Write;
use versus_core::Metric;
use versus_logic::ConfidenceTier;
use versus_stats::QualityLevel;

fn level_icon(level: QualityLevel) -> &'static str {
    match level {
        QualityLevel::Valid => "✅",
        QualityLevel::Warning => "⚠️",
        QualityLevel::Invalid => "❌",
    }
}

fn format_value(metric: Metric, value: f64) -> String {
    match metric {
        Metric::ExecutionTime => format!("{:.2} ms", value),
        Metric::MemoryUsage => format!("{:.1} KiB", value / 1024.0),
    }
}

/// Render the report as GitHub-flavoured Markdown
pub fn generate_markdown_report(report: &PipelineReport) -> String {
    let mut out = String::new();
    let a = &report.variants.a;
    let b = &report.variants.b;

    // Writing into a String cannot fail
    let _ = writeln!(out, "# Versus: {} vs {}\n", a, b);
    let _ = writeln!(
        out,
        "_Generated {} · versus {}{}_\n",
        report.meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        report.meta.version,
        report
            .meta
            .git_commit
            .as_deref()
            .map(|c| format!(" · commit `{}`", &c[..c.len().min(12)]))
            .unwrap_or_default()
    );

    let overall = &report.decision.overall;
    let _ = writeln!(out, "## Recommendation\n");
    match &overall.recommendation {
        Some(winner) => {
            let _ = writeln!(
                out,
                "**{}** (confidence {:.0}%)\n",
                winner,
                overall.confidence_score * 100.0
            );
        }
        None => {
            let _ = writeln!(out, "**No clear winner**\n");
        }
    }
    let _ = writeln!(out, "{}\n", overall.rationale);

    if let Some(execution) = &report.execution {
        let _ = writeln!(out, "## Execution\n");
        let _ = writeln!(
            out,
            "- State: `{:?}`\n- Samples: {} ({} failed)\n- Skipped cells: {}\n- Duration: {:.0} ms",
            execution.state,
            execution.total_samples,
            execution.failed_samples,
            execution.skipped_cells,
            execution.duration_ms
        );
        if let Some(abort) = &execution.abort {
            let _ = writeln!(
                out,
                "- **Aborted**: {} ({} of {} trials failed)",
                abort.reason, abort.failed_trials, abort.completed_trials
            );
        }
        out.push('\n');
    }

    if !report.decision.variant_summaries.is_empty() {
        let _ = writeln!(out, "## Variants\n");
        let _ = writeln!(
            out,
            "| Variant | Avg time | Avg memory | Success | Time wins | Memory wins |"
        );
        let _ = writeln!(
            out,
            "|---------|---------:|-----------:|--------:|----------:|------------:|"
        );
        for s in &report.decision.variant_summaries {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                s.variant,
                s.avg_execution_time_ms
                    .map_or("n/a".to_string(), |v| format_value(Metric::ExecutionTime, v)),
                s.avg_memory_bytes
                    .map_or("n/a".to_string(), |v| format_value(Metric::MemoryUsage, v)),
                s.success_rate
                    .map_or("n/a".to_string(), |r| format!("{:.1}%", r * 100.0)),
                s.execution_wins,
                s.memory_wins
            );
        }
        out.push('\n');
    }

    if !report.decision.tasks.is_empty() {
        let _ = writeln!(out, "## Tasks\n");
        let _ = writeln!(out, "| Task | Recommendation | Confidence | Evidence |");
        let _ = writeln!(out, "|------|----------------|------------|----------|");
        for task in &report.decision.tasks {
            let evidence: Vec<String> = task
                .evidence
                .iter()
                .filter(|v| v.tier != ConfidenceTier::Neutral)
                .map(|v| format!("{} {}: {}", v.scale, v.metric, v.advantage))
                .collect();
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                task.task,
                task.recommendation
                    .as_ref()
                    .map_or("neutral", |v| v.as_str()),
                task.tier,
                if evidence.is_empty() {
                    "no significant difference".to_string()
                } else {
                    evidence.join("<br>")
                }
            );
        }
        out.push('\n');
    }

    if !report.comparisons.is_empty() {
        let _ = writeln!(out, "## Comparisons\n");
        let _ = writeln!(
            out,
            "| Task | Scale | Metric | {} | {} | p-value | Cohen's d | Effect |",
            a, b
        );
        let _ = writeln!(
            out,
            "|------|-------|--------|---:|---:|--------:|----------:|--------|"
        );
        for r in &report.comparisons {
            let c = &r.comparison;
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {:.4} | {:+.2} | {} |",
                r.task,
                r.scale,
                r.metric,
                format_value(r.metric, c.stats_a.mean),
                format_value(r.metric, c.stats_b.mean),
                c.p_value(),
                c.cohens_d(),
                c.magnitude()
            );
        }
        out.push('\n');
    }

    let failed: Vec<_> = report.validations.iter().filter(|v| !v.passed()).collect();
    let allowed: usize = report
        .validations
        .iter()
        .map(|v| v.allow_list_used.len())
        .sum();
    let _ = writeln!(out, "## Validation\n");
    let _ = writeln!(
        out,
        "{} of {} task/scale pairs produced matching digests.",
        report.validations.len() - failed.len(),
        report.validations.len()
    );
    if allowed > 0 {
        let _ = writeln!(out, "{} allow-listed digest(s) were accepted.", allowed);
    }
    for v in failed {
        for failure in &v.failures {
            let _ = writeln!(out, "- ❌ {} / {}: {}", v.task, v.scale, failure);
        }
    }
    out.push('\n');

    let quality = &report.quality;
    let _ = writeln!(out, "## Data Quality\n");
    let _ = writeln!(
        out,
        "{} Dataset **{}**: {} groups, {} invalid, {} warning, {} outliers removed",
        level_icon(quality.dataset.level),
        quality.dataset.level,
        quality.dataset.total_groups,
        quality.dataset.invalid_groups,
        quality.dataset.warning_groups,
        quality.outliers_removed
    );
    for reason in &quality.dataset.reasons {
        let _ = writeln!(out, "- {}", reason);
    }
    for assessment in quality
        .assessments
        .iter()
        .filter(|a| a.level != QualityLevel::Valid)
    {
        let _ = writeln!(
            out,
            "- {} `{}`: {}",
            level_icon(assessment.level),
            assessment.cell,
            assessment.reasons.join("; ")
        );
    }
    out.push('\n');

    let ledger = &report.ledger;
    let _ = writeln!(out, "## Data Ledger\n");
    let _ = writeln!(
        out,
        "- Used: {} samples across {} cells",
        ledger.used.iter().map(|u| u.samples).sum::<usize>(),
        ledger.used.len()
    );
    let _ = writeln!(out, "- Discarded: {} samples", ledger.discarded.len());
    let _ = writeln!(out, "- Excluded: {} entries", ledger.excluded.len());
    for e in &ledger.excluded {
        let scope = e
            .scale
            .map(|s| format!("{} / {}", e.task, s))
            .unwrap_or_else(|| e.task.clone());
        let _ = writeln!(out, "  - {} ({:?}): {}", scope, e.stage, e.reason);
    }
    out.push('\n');

    if !report.decision.decision_factors.is_empty() {
        let _ = writeln!(out, "## Beyond Performance\n");
        for factor in &report.decision.decision_factors {
            let _ = writeln!(out, "- {}", factor);
        }
    }

    out
}
