#![warn(missing_docs)]
//! Versus Decision Logic
//!
//! The two stages that turn statistics into a recommendation:
//! - Cross-variant validation of FNV-1a result digests against a reference
//!   oracle, with an audited per-task allow-list
//! - The decision engine, which tiers each comparison, scores tasks and
//!   weighs tasks into an overall recommendation
//!
//! Validation runs first; a task whose digests disagree is excluded from the
//! decision no matter how fast either variant was.

mod decision;
mod digest;
mod validation;

pub use decision::{
    ConfidenceTier, DecisionEngine, DecisionReport, HIGH_CONFIDENCE_EFFECT,
    MEDIUM_CONFIDENCE_EFFECT, MetricVerdict, OverallRecommendation, TaskExclusion,
    TaskRecommendation, VariantSummary,
};
pub use digest::{
    DEFAULT_PRECISION_DIGITS, FNV_OFFSET_BASIS, FNV_PRIME, Fnv1a, digest_f32s, fnv1a_32,
    round_f32_to_precision,
};
pub use validation::{
    CrossVariantValidator, DigestAllowList, ReferenceOracle, ValidationFailure,
    ValidationOutcome, ValidationStatus,
};
