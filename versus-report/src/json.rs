//! JSON Output
//!
//! Full pipeline reports and raw sample sets round-trip through JSON, so a
//! saved run can be re-analyzed without executing anything.

use crate::report::{PipelineReport, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use versus_core::{Sample, VariantPair};

/// Errors reading or writing report files
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// File could not be read or written
    #[error("{}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// File content is not valid JSON for the expected type
    #[error("{}: {source}", path.display())]
    Json {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
    /// File was written by an incompatible schema
    #[error("{}: unsupported schema version {found}", path.display())]
    Schema {
        /// File involved
        path: PathBuf,
        /// Version found in the file
        found: u32,
    },
}

/// Raw samples of one run, as saved by `--save-samples`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    /// Schema version
    pub schema_version: u32,
    /// Variants the samples compare
    pub variants: VariantPair,
    /// Samples in recording order
    pub samples: Vec<Sample>,
}

impl SampleSet {
    /// Sample set at the current schema version
    pub fn new(variants: VariantPair, samples: Vec<Sample>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            variants,
            samples,
        }
    }
}

/// Generate a prettified JSON report.
pub fn generate_json_report(report: &PipelineReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ReportError> {
    let content = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a report to `path`
pub fn save_json_report(report: &PipelineReport, path: &Path) -> Result<(), ReportError> {
    write_json(path, report)
}

/// Read a report written by [`save_json_report`]
pub fn load_json_report(path: &Path) -> Result<PipelineReport, ReportError> {
    let report: PipelineReport = read_json(path)?;
    if report.meta.schema_version != SCHEMA_VERSION {
        return Err(ReportError::Schema {
            path: path.to_path_buf(),
            found: report.meta.schema_version,
        });
    }
    Ok(report)
}

/// Write raw samples to `path`
pub fn save_samples(set: &SampleSet, path: &Path) -> Result<(), ReportError> {
    write_json(path, set)
}

/// Read raw samples written by [`save_samples`]
pub fn load_samples(path: &Path) -> Result<SampleSet, ReportError> {
    let set: SampleSet = read_json(path)?;
    if set.schema_version != SCHEMA_VERSION {
        return Err(ReportError::Schema {
            path: path.to_path_buf(),
            found: set.schema_version,
        });
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use versus_core::{Cell, FailureReason, Scale};

    fn set() -> SampleSet {
        let cell = Cell::new("sort", "rust", Scale::Medium);
        SampleSet::new(
            VariantPair::new("rust", "go"),
            vec![
                Sample::succeeded(cell.clone(), 0, 1, 12.5, 4096, Some(0xdead_beef)),
                Sample::failed(cell, 1, 3, FailureReason::ExecutionFailure("trap".into())),
            ],
        )
    }

    #[test]
    fn test_samples_survive_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.json");
        save_samples(&set(), &path).unwrap();
        assert_eq!(load_samples(&path).unwrap(), set());
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.json");
        let mut old = set();
        old.schema_version = 0;
        save_samples(&old, &path).unwrap();
        assert!(matches!(
            load_samples(&path),
            Err(ReportError::Schema { found: 0, .. })
        ));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(load_samples(&missing), Err(ReportError::Io { .. })));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{ not json").unwrap();
        let err = load_samples(&garbage).unwrap_err();
        assert!(matches!(err, ReportError::Json { .. }));
        assert!(err.to_string().contains("garbage.json"));
    }
}
