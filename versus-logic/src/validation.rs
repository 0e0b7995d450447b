//! Cross-Variant Validation
//!
//! Confirms both variants compute the same thing before their speed is
//! compared. Every digest a variant produced for a (task, scale) must equal the
//! reference digest from the trusted variant, or appear in that task's
//! allow-list. Failures exclude the whole task from the decision.

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};
use versus_core::{AllowedDigest, Sample, Scale, ValidationConfig, VariantId, VariantPair};

/// Reference digests, one per (task, scale)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceOracle {
    trusted: VariantId,
    references: BTreeMap<(String, Scale), u32>,
}

impl ReferenceOracle {
    /// Empty oracle for `trusted`
    pub fn new(trusted: impl Into<VariantId>) -> Self {
        Self {
            trusted: trusted.into(),
            references: BTreeMap::new(),
        }
    }

    /// Oracle holding, per (task, scale), the most frequent digest among the
    /// trusted variant's successful samples. Ties go to the smaller digest.
    pub fn from_samples(samples: &[Sample], trusted: &VariantId) -> Self {
        let mut counts: FxHashMap<(&str, Scale), FxHashMap<u32, usize>> = FxHashMap::default();
        for sample in samples {
            if !sample.success || &sample.cell.variant != trusted {
                continue;
            }
            if let Some(digest) = sample.result_digest {
                *counts
                    .entry((sample.cell.task.as_str(), sample.cell.scale))
                    .or_default()
                    .entry(digest)
                    .or_default() += 1;
            }
        }

        let references = counts
            .into_iter()
            .filter_map(|((task, scale), digests)| {
                digests
                    .into_iter()
                    .max_by(|(da, ca), (db, cb)| ca.cmp(cb).then(db.cmp(da)))
                    .map(|(digest, _)| ((task.to_string(), scale), digest))
            })
            .collect();

        Self {
            trusted: trusted.clone(),
            references,
        }
    }

    /// Set the reference for one (task, scale)
    pub fn with_reference(mut self, task: impl Into<String>, scale: Scale, digest: u32) -> Self {
        self.references.insert((task.into(), scale), digest);
        self
    }

    /// Reference digest for (task, scale)
    pub fn reference(&self, task: &str, scale: Scale) -> Option<u32> {
        self.references.get(&(task.to_string(), scale)).copied()
    }

    /// Variant the references were taken from
    pub fn trusted(&self) -> &VariantId {
        &self.trusted
    }

    /// Number of (task, scale) references held
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Whether no reference is held
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Explicit, audited digests accepted per task in addition to the reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestAllowList {
    entries: BTreeMap<String, Vec<AllowedDigest>>,
}

impl DigestAllowList {
    /// Allow-list from configuration
    pub fn new(entries: BTreeMap<String, Vec<AllowedDigest>>) -> Self {
        Self { entries }
    }

    /// Entry accepting `digest` for `task`
    pub fn lookup(&self, task: &str, digest: u32) -> Option<&AllowedDigest> {
        self.entries.get(task)?.iter().find(|e| e.digest == digest)
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether the list accepts nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pass or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// Both variants agree with the reference
    Passed,
    /// At least one failure was found
    Failed,
}

/// One reason a (task, scale) failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    /// Digests that are neither the reference nor allow-listed
    Mismatch {
        /// Variant that produced them
        variant: VariantId,
        /// Offending digests
        digests: Vec<u32>,
    },
    /// The trusted variant produced no reference
    MissingReference,
    /// A variant produced no digest at all
    NoDigests {
        /// Variant without digests
        variant: VariantId,
    },
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::Mismatch { variant, digests } => {
                let list: Vec<String> = digests.iter().map(|d| format!("{:#010x}", d)).collect();
                write!(f, "{} digest mismatch: {}", variant, list.join(", "))
            }
            ValidationFailure::MissingReference => write!(f, "no reference digest"),
            ValidationFailure::NoDigests { variant } => write!(f, "{} produced no digests", variant),
        }
    }
}

/// Validation result for one (task, scale)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Task name
    pub task: String,
    /// Scale
    pub scale: Scale,
    /// Pass or fail
    pub status: ValidationStatus,
    /// Reference digest, if the oracle has one
    pub reference: Option<u32>,
    /// Distinct digests of variant A
    pub digests_a: Vec<u32>,
    /// Distinct digests of variant B
    pub digests_b: Vec<u32>,
    /// Allow-list entries that accepted a digest
    pub allow_list_used: Vec<AllowedDigest>,
    /// Why it failed
    pub failures: Vec<ValidationFailure>,
}

impl ValidationOutcome {
    /// Whether the (task, scale) passed
    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}

fn distinct(digests: &[u32]) -> Vec<u32> {
    digests
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Checks digests of both variants against a reference oracle
#[derive(Debug, Clone, Default)]
pub struct CrossVariantValidator {
    allow_list: DigestAllowList,
}

impl CrossVariantValidator {
    /// Validator with the configured allow-list
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            allow_list: DigestAllowList::new(config.allow_list.clone()),
        }
    }

    /// Allow-list in use
    pub fn allow_list(&self) -> &DigestAllowList {
        &self.allow_list
    }

    /// Validate one (task, scale) given each variant's digests
    pub fn validate(
        &self,
        task: &str,
        scale: Scale,
        variants: &VariantPair,
        a_digests: &[u32],
        b_digests: &[u32],
        oracle: &ReferenceOracle,
    ) -> ValidationOutcome {
        let digests_a = distinct(a_digests);
        let digests_b = distinct(b_digests);
        let reference = oracle.reference(task, scale);

        let mut failures = Vec::new();
        let mut allow_list_used: Vec<AllowedDigest> = Vec::new();

        for (variant, digests) in [(&variants.a, &digests_a), (&variants.b, &digests_b)] {
            if digests.is_empty() {
                failures.push(ValidationFailure::NoDigests {
                    variant: variant.clone(),
                });
                continue;
            }
            let Some(reference) = reference else {
                continue;
            };

            let mut mismatched = Vec::new();
            for &digest in digests.iter().filter(|&&d| d != reference) {
                match self.allow_list.lookup(task, digest) {
                    Some(entry) => {
                        warn!(
                            task,
                            %scale,
                            %variant,
                            digest = %format!("{:#010x}", digest),
                            reason = %entry.reason,
                            "digest accepted by allow-list"
                        );
                        if !allow_list_used.contains(entry) {
                            allow_list_used.push(entry.clone());
                        }
                    }
                    None => mismatched.push(digest),
                }
            }
            if !mismatched.is_empty() {
                failures.push(ValidationFailure::Mismatch {
                    variant: variant.clone(),
                    digests: mismatched,
                });
            }
        }

        if reference.is_none() {
            failures.push(ValidationFailure::MissingReference);
        }

        let status = if failures.is_empty() {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };
        debug!(task, %scale, ?status, "digests validated");

        ValidationOutcome {
            task: task.to_string(),
            scale,
            status,
            reference,
            digests_a,
            digests_b,
            allow_list_used,
            failures,
        }
    }

    /// Validate every (task, scale) present in `samples`
    pub fn validate_samples(
        &self,
        samples: &[Sample],
        variants: &VariantPair,
        oracle: &ReferenceOracle,
    ) -> Vec<ValidationOutcome> {
        let mut digests: FxHashMap<(&str, Scale), [Vec<u32>; 2]> = FxHashMap::default();
        for sample in samples {
            if !sample.success {
                continue;
            }
            let side = if sample.cell.variant == variants.a {
                0
            } else if sample.cell.variant == variants.b {
                1
            } else {
                continue;
            };
            let entry = digests
                .entry((sample.cell.task.as_str(), sample.cell.scale))
                .or_default();
            if let Some(digest) = sample.result_digest {
                entry[side].push(digest);
            }
        }

        let mut keys: Vec<_> = digests.into_iter().collect();
        keys.sort_by(|(a, _), (b, _)| a.cmp(b));

        let outcomes: Vec<ValidationOutcome> = keys
            .into_iter()
            .map(|((task, scale), [a, b])| self.validate(task, scale, variants, &a, &b, oracle))
            .collect();

        let failed = outcomes.iter().filter(|o| !o.passed()).count();
        info!(checked = outcomes.len(), failed, "cross-variant validation finished");
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use versus_core::{Cell, FailureReason};

    fn variants() -> VariantPair {
        VariantPair::new("rust", "go")
    }

    fn sample(variant: &str, trial: u32, digest: Option<u32>) -> Sample {
        Sample::succeeded(Cell::new("sort", variant, Scale::Small), trial, 1, 1.0, 1, digest)
    }

    #[test]
    fn test_oracle_takes_most_frequent_trusted_digest() {
        let samples = vec![
            sample("rust", 0, Some(7)),
            sample("rust", 1, Some(7)),
            sample("rust", 2, Some(9)),
            sample("go", 0, Some(9)),
            sample("go", 1, Some(9)),
            sample("go", 2, Some(9)),
        ];
        let oracle = ReferenceOracle::from_samples(&samples, &VariantId::new("rust"));
        assert_eq!(oracle.reference("sort", Scale::Small), Some(7));
        assert_eq!(oracle.reference("sort", Scale::Large), None);
        assert_eq!(oracle.len(), 1);
    }

    #[test]
    fn test_oracle_ignores_failed_samples_and_breaks_ties_low() {
        let mut samples = vec![sample("rust", 0, Some(9)), sample("rust", 1, Some(3))];
        let mut failed = Sample::failed(
            Cell::new("sort", "rust", Scale::Small),
            2,
            3,
            FailureReason::Timeout,
        );
        failed.result_digest = Some(9);
        samples.push(failed);
        let oracle = ReferenceOracle::from_samples(&samples, &VariantId::new("rust"));
        assert_eq!(oracle.reference("sort", Scale::Small), Some(3));
    }

    #[test]
    fn test_matching_digests_pass() {
        let oracle = ReferenceOracle::new("rust").with_reference("sort", Scale::Small, 42);
        let outcome = CrossVariantValidator::default().validate(
            "sort",
            Scale::Small,
            &variants(),
            &[42, 42],
            &[42],
            &oracle,
        );
        assert!(outcome.passed());
        assert_eq!(outcome.digests_a, vec![42]);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_mismatch_fails() {
        let oracle = ReferenceOracle::new("rust").with_reference("sort", Scale::Small, 42);
        let outcome = CrossVariantValidator::default().validate(
            "sort",
            Scale::Small,
            &variants(),
            &[42],
            &[42, 43],
            &oracle,
        );
        assert_eq!(outcome.status, ValidationStatus::Failed);
        assert_eq!(
            outcome.failures,
            vec![ValidationFailure::Mismatch {
                variant: VariantId::new("go"),
                digests: vec![43],
            }]
        );
    }

    #[test]
    fn test_allow_list_accepts_and_records() {
        let mut config = ValidationConfig::default();
        config.allow_list.insert(
            "sort".to_string(),
            vec![AllowedDigest {
                digest: 43,
                reason: "go formats -0.0 as 0.0".to_string(),
            }],
        );
        let validator = CrossVariantValidator::new(&config);
        let oracle = ReferenceOracle::new("rust").with_reference("sort", Scale::Small, 42);
        let outcome = validator.validate("sort", Scale::Small, &variants(), &[42], &[43], &oracle);
        assert!(outcome.passed());
        assert_eq!(outcome.allow_list_used.len(), 1);
        assert_eq!(outcome.allow_list_used[0].digest, 43);

        // Allow-list entries are per task
        let other = ReferenceOracle::new("rust").with_reference("hash", Scale::Small, 42);
        let outcome = validator.validate("hash", Scale::Small, &variants(), &[42], &[43], &other);
        assert!(!outcome.passed());
    }

    #[test]
    fn test_missing_reference_and_digests() {
        let oracle = ReferenceOracle::new("rust");
        let outcome = CrossVariantValidator::default().validate(
            "sort",
            Scale::Small,
            &variants(),
            &[],
            &[5],
            &oracle,
        );
        assert!(!outcome.passed());
        assert!(outcome.failures.contains(&ValidationFailure::MissingReference));
        assert!(outcome.failures.contains(&ValidationFailure::NoDigests {
            variant: VariantId::new("rust"),
        }));
    }

    #[test]
    fn test_validate_samples_groups_by_task_and_scale() {
        let mut samples = vec![
            sample("rust", 0, Some(1)),
            sample("go", 0, Some(1)),
            Sample::succeeded(Cell::new("fft", "rust", Scale::Large), 0, 1, 1.0, 1, Some(5)),
            Sample::succeeded(Cell::new("fft", "go", Scale::Large), 0, 1, 1.0, 1, Some(6)),
        ];
        samples.push(sample("zig", 0, Some(99)));

        let oracle = ReferenceOracle::from_samples(&samples, &VariantId::new("rust"));
        let outcomes =
            CrossVariantValidator::default().validate_samples(&samples, &variants(), &oracle);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].task, "fft");
        assert!(!outcomes[0].passed());
        assert_eq!(outcomes[1].task, "sort");
        assert!(outcomes[1].passed());
    }
}
