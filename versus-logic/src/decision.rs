//! Decision Engine
//!
//! Folds per-metric comparisons into a recommendation per task and overall.
//!
//! ```text
//! ComparisonResult ──► MetricVerdict (tier, favors)
//!                            │  Σ tier weight × metric weight (signed)
//!                            ▼
//!                    TaskRecommendation
//!                            │  Σ tier weight per variant
//!                            ▼
//!                  OverallRecommendation (majority share, confidence)
//! ```
//!
//! Tasks that failed cross-variant validation never reach the tally.

use crate::validation::ValidationOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};
use versus_core::{
    DecisionConfig, Metric, Sample, Scale, StatisticsConfig, TierWeights, VariantId, VariantPair,
};
use versus_stats::{ComparisonResult, ComparisonStatus};

/// |d| at or above which a significant difference is high confidence
pub const HIGH_CONFIDENCE_EFFECT: f64 = 0.8;

/// |d| at or above which a significant difference is medium confidence
pub const MEDIUM_CONFIDENCE_EFFECT: f64 = 0.5;

/// Strength of the evidence behind a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    /// Not significant, or not compared
    Neutral,
    /// Significant with a small or negligible effect
    Low,
    /// Significant with a medium effect
    Medium,
    /// Significant with a large effect
    High,
}

impl ConfidenceTier {
    /// Tally weight of this tier
    pub fn weight(self, weights: &TierWeights) -> f64 {
        match self {
            ConfidenceTier::Neutral => 0.0,
            ConfidenceTier::Low => weights.low,
            ConfidenceTier::Medium => weights.medium,
            ConfidenceTier::High => weights.high,
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::Neutral => write!(f, "neutral"),
            ConfidenceTier::Low => write!(f, "low"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::High => write!(f, "high"),
        }
    }
}

/// Verdict on one (task, scale, metric) comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricVerdict {
    /// Scale
    pub scale: Scale,
    /// Metric
    pub metric: Metric,
    /// Evidence strength
    pub tier: ConfidenceTier,
    /// Variant with the lower mean, absent when neutral
    pub favors: Option<VariantId>,
    /// p-value of the comparison
    pub p_value: f64,
    /// Cohen's d (A - B)
    pub cohens_d: f64,
    /// Relative improvement of the better variant over the other, in percent
    pub advantage_pct: f64,
    /// Human-readable advantage, e.g. "rust 12.3% faster"
    pub advantage: String,
    /// Signed contribution to the task score, positive favors A
    pub score: f64,
}

/// Recommendation for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecommendation {
    /// Task name
    pub task: String,
    /// Recommended variant, absent when neutral
    pub recommendation: Option<VariantId>,
    /// Strongest tier supporting the recommendation
    pub tier: ConfidenceTier,
    /// Signed score, positive favors A
    pub score: f64,
    /// Per-metric verdicts the score was built from
    pub evidence: Vec<MetricVerdict>,
}

/// A task left out of the decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExclusion {
    /// Task name
    pub task: String,
    /// Why it was excluded
    pub reasons: Vec<String>,
}

/// Recommendation across all tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallRecommendation {
    /// Recommended variant, absent when evidence is insufficient
    pub recommendation: Option<VariantId>,
    /// `|a - b| / (a + b)` over the tier-weighted tallies
    pub confidence_score: f64,
    /// Tier-weighted tally for variant A
    pub weight_a: f64,
    /// Tier-weighted tally for variant B
    pub weight_b: f64,
    /// Why the recommendation came out this way
    pub rationale: String,
}

/// Raw averages and win counts for one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    /// Variant summarized
    pub variant: VariantId,
    /// Trials recorded for the variant
    pub trials: usize,
    /// Mean execution time over successful trials, in milliseconds
    pub avg_execution_time_ms: Option<f64>,
    /// Mean memory over successful trials, in bytes
    pub avg_memory_bytes: Option<f64>,
    /// Fraction of trials that succeeded
    pub success_rate: Option<f64>,
    /// Execution-time verdicts this variant won
    pub execution_wins: usize,
    /// Memory verdicts this variant won
    pub memory_wins: usize,
}

impl VariantSummary {
    fn new(variant: &VariantId, samples: &[Sample], tasks: &[TaskRecommendation]) -> Self {
        let own: Vec<&Sample> = samples.iter().filter(|s| &s.cell.variant == variant).collect();
        let ok: Vec<&Sample> = own.iter().copied().filter(|s| s.success).collect();
        let mean = |values: Vec<f64>| -> Option<f64> {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };
        let wins = |metric: Metric| -> usize {
            tasks
                .iter()
                .flat_map(|t| &t.evidence)
                .filter(|v| v.metric == metric && v.favors.as_ref() == Some(variant))
                .count()
        };

        Self {
            variant: variant.clone(),
            trials: own.len(),
            avg_execution_time_ms: mean(ok.iter().map(|s| s.execution_time_ms).collect()),
            avg_memory_bytes: mean(ok.iter().map(|s| s.memory_used_bytes as f64).collect()),
            success_rate: (!own.is_empty()).then(|| ok.len() as f64 / own.len() as f64),
            execution_wins: wins(Metric::ExecutionTime),
            memory_wins: wins(Metric::MemoryUsage),
        }
    }

    /// Execution and memory wins together
    pub fn total_wins(&self) -> usize {
        self.execution_wins + self.memory_wins
    }
}

/// Output of [`DecisionEngine::decide`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReport {
    /// Variants compared
    pub variants: VariantPair,
    /// Per-task recommendations, by task name
    pub tasks: Vec<TaskRecommendation>,
    /// Overall recommendation
    pub overall: OverallRecommendation,
    /// Tasks excluded by validation
    pub excluded: Vec<TaskExclusion>,
    /// Per-variant averages and win counts, A first
    #[serde(default)]
    pub variant_summaries: Vec<VariantSummary>,
    /// Non-performance considerations to weigh alongside the numbers
    pub decision_factors: Vec<String>,
}

impl DecisionReport {
    /// Recommendation for a task
    pub fn task(&self, name: &str) -> Option<&TaskRecommendation> {
        self.tasks.iter().find(|t| t.task == name)
    }

    /// Whether a task was excluded
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.iter().any(|e| e.task == name)
    }

    /// Summary for a variant
    pub fn summary(&self, variant: &VariantId) -> Option<&VariantSummary> {
        self.variant_summaries.iter().find(|s| &s.variant == variant)
    }
}

/// Aggregates comparisons and validations into recommendations
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    config: DecisionConfig,
    alpha: f64,
}

impl DecisionEngine {
    /// Engine with decision settings and the significance level in use
    pub fn new(config: DecisionConfig, statistics: &StatisticsConfig) -> Self {
        Self {
            config,
            alpha: statistics.significance_alpha,
        }
    }

    /// Tier of one comparison: neutral unless `p < alpha`, then by |d|
    pub fn classify(&self, result: &ComparisonResult) -> ConfidenceTier {
        let c = &result.comparison;
        if c.status != ComparisonStatus::Compared || c.p_value() >= self.alpha {
            return ConfidenceTier::Neutral;
        }
        // Fixed cut points: the configurable magnitude labels only describe the effect
        let d = c.cohens_d().abs();
        if d >= HIGH_CONFIDENCE_EFFECT {
            ConfidenceTier::High
        } else if d >= MEDIUM_CONFIDENCE_EFFECT {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    /// Build the decision report
    ///
    /// `samples` feed only the per-variant summaries; the recommendation is
    /// built from `comparisons` alone.
    pub fn decide(
        &self,
        comparisons: &[ComparisonResult],
        validations: &[ValidationOutcome],
        variants: &VariantPair,
        samples: &[Sample],
    ) -> DecisionReport {
        let mut excluded: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for outcome in validations.iter().filter(|o| !o.passed()) {
            let reasons = excluded.entry(outcome.task.as_str()).or_default();
            reasons.extend(
                outcome
                    .failures
                    .iter()
                    .map(|f| format!("{}: {}", outcome.scale, f)),
            );
        }

        let mut by_task: BTreeMap<&str, Vec<MetricVerdict>> = BTreeMap::new();
        for result in comparisons {
            if excluded.contains_key(result.task.as_str()) {
                continue;
            }
            by_task
                .entry(result.task.as_str())
                .or_default()
                .push(self.verdict(result, variants));
        }

        let tasks: Vec<TaskRecommendation> = by_task
            .into_iter()
            .map(|(task, evidence)| self.recommend_task(task, evidence, variants))
            .collect();
        let overall = self.recommend_overall(&tasks, variants);
        let variant_summaries = vec![
            VariantSummary::new(&variants.a, samples, &tasks),
            VariantSummary::new(&variants.b, samples, &tasks),
        ];

        info!(
            tasks = tasks.len(),
            excluded = excluded.len(),
            recommendation = overall.recommendation.as_ref().map_or("neutral", VariantId::as_str),
            confidence = overall.confidence_score,
            "decision made"
        );

        DecisionReport {
            variants: variants.clone(),
            tasks,
            overall,
            excluded: excluded
                .into_iter()
                .map(|(task, reasons)| TaskExclusion {
                    task: task.to_string(),
                    reasons,
                })
                .collect(),
            variant_summaries,
            decision_factors: self.config.decision_factors.clone(),
        }
    }

    fn verdict(&self, result: &ComparisonResult, variants: &VariantPair) -> MetricVerdict {
        let c = &result.comparison;
        let tier = self.classify(result);
        let mean_a = c.stats_a.mean;
        let mean_b = c.stats_b.mean;

        let (winner, winner_mean, loser_mean, sign) = if mean_a < mean_b {
            (&variants.a, mean_a, mean_b, 1.0)
        } else {
            (&variants.b, mean_b, mean_a, -1.0)
        };
        let advantage_pct = if loser_mean != 0.0 {
            (loser_mean - winner_mean) / loser_mean * 100.0
        } else {
            0.0
        };

        let (favors, advantage, score) = if tier == ConfidenceTier::Neutral || mean_a == mean_b {
            (None, "no significant difference".to_string(), 0.0)
        } else {
            let what = match result.metric {
                Metric::ExecutionTime => "faster",
                Metric::MemoryUsage => "less memory",
            };
            let weight = tier.weight(&self.config.tier_weights)
                * self.config.metric_weights.weight(result.metric);
            (
                Some(winner.clone()),
                format!("{} {:.1}% {}", winner, advantage_pct, what),
                sign * weight,
            )
        };

        debug!(
            task = %result.task,
            scale = %result.scale,
            metric = %result.metric,
            %tier,
            "{}",
            advantage
        );
        MetricVerdict {
            scale: result.scale,
            metric: result.metric,
            tier,
            favors,
            p_value: c.p_value(),
            cohens_d: c.cohens_d(),
            advantage_pct,
            advantage,
            score,
        }
    }

    fn recommend_task(
        &self,
        task: &str,
        evidence: Vec<MetricVerdict>,
        variants: &VariantPair,
    ) -> TaskRecommendation {
        let score: f64 = evidence.iter().map(|v| v.score).sum();
        let (recommendation, tier) = if score == 0.0 {
            (None, ConfidenceTier::Neutral)
        } else {
            let winner = if score > 0.0 { &variants.a } else { &variants.b };
            let tier = evidence
                .iter()
                .filter(|v| v.favors.as_ref() == Some(winner))
                .map(|v| v.tier)
                .max()
                .unwrap_or(ConfidenceTier::Neutral);
            (Some(winner.clone()), tier)
        };

        TaskRecommendation {
            task: task.to_string(),
            recommendation,
            tier,
            score,
            evidence,
        }
    }

    fn recommend_overall(
        &self,
        tasks: &[TaskRecommendation],
        variants: &VariantPair,
    ) -> OverallRecommendation {
        let weights = &self.config.tier_weights;
        let tally = |variant: &VariantId| -> f64 {
            tasks
                .iter()
                .filter(|t| t.recommendation.as_ref() == Some(variant))
                .map(|t| t.tier.weight(weights))
                .sum()
        };
        let weight_a = tally(&variants.a);
        let weight_b = tally(&variants.b);
        let total = weight_a + weight_b;
        let confidence_score = if total > 0.0 {
            (weight_a - weight_b).abs() / total
        } else {
            0.0
        };

        let insufficient = |why: String| OverallRecommendation {
            recommendation: None,
            confidence_score,
            weight_a,
            weight_b,
            rationale: format!(
                "insufficient evidence: {}; decide on other factors: {}",
                why,
                self.config.decision_factors.join(", ")
            ),
        };

        if total == 0.0 {
            return insufficient("no task showed a significant difference".to_string());
        }
        if weight_a == weight_b {
            return insufficient(format!("tied at {:.1} each", weight_a));
        }

        let (winner, winning) = if weight_a > weight_b {
            (&variants.a, weight_a)
        } else {
            (&variants.b, weight_b)
        };
        let share = winning / total;
        if share < self.config.majority_threshold {
            return insufficient(format!(
                "{} holds {:.0}% of the weighted evidence, below the {:.0}% majority",
                winner,
                share * 100.0,
                self.config.majority_threshold * 100.0
            ));
        }

        let won = tasks
            .iter()
            .filter(|t| t.recommendation.as_ref() == Some(winner))
            .count();
        OverallRecommendation {
            recommendation: Some(winner.clone()),
            confidence_score,
            weight_a,
            weight_b,
            rationale: format!(
                "{} wins {} of {} tasks with {:.0}% of the weighted evidence",
                winner,
                won,
                tasks.len(),
                share * 100.0
            ),
        }
    }
}
