//! Failure Recorder
//!
//! Writes the rows that could not be provisioned to a sheet with the same
//! columns as the input plus an `_error` column. The artifact can be fed
//! straight back in as input once the cause is fixed: annotation columns
//! are ignored on read.

use super::outcome::{ProvisioningOutcome, Step};
use super::row::RowError;
use crate::sheet::{self, SheetError, SourceRecord};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column holding the failure reason
pub const ERROR_COLUMN: &str = "_error";

#[derive(Debug, Error)]
pub enum FailureRecordError {
    #[error("refusing to write failures over the input sheet {0}")]
    WouldOverwriteInput(PathBuf),

    #[error(transparent)]
    Write(#[from] SheetError),
}

/// One row to retry, with why it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEntry {
    pub source: SourceRecord,
    pub step: String,
    pub reason: String,
}

impl FailureEntry {
    /// Entry for an aborted row; `None` when the row succeeded
    pub fn from_outcome(outcome: &ProvisioningOutcome) -> Option<Self> {
        let reason = outcome.error_message()?;
        Some(Self {
            source: outcome.row.source.clone(),
            step: outcome.failed_step().unwrap_or_default(),
            reason,
        })
    }

    /// Entry for a row rejected before provisioning
    pub fn rejected(source: SourceRecord, error: &RowError) -> Self {
        Self {
            source,
            step: Step::LoadRow.to_string(),
            reason: format!("{} failed: {}", Step::LoadRow, error),
        }
    }
}

/// Columns and cells of the failure artifact.
///
/// Columns are the union of the failed rows' columns in first-seen order,
/// followed by [`ERROR_COLUMN`]. Cells keep their original, untrimmed text.
pub fn failure_table(failures: &[FailureEntry]) -> (Vec<String>, Vec<Vec<String>>) {
    let mut headers: Vec<String> = Vec::new();
    for entry in failures {
        for (name, _) in &entry.source.fields {
            if !headers.contains(name) {
                headers.push(name.clone());
            }
        }
    }

    let rows = failures
        .iter()
        .map(|entry| {
            let mut cells: Vec<String> = headers
                .iter()
                .map(|h| entry.source.raw(h).to_string())
                .collect();
            cells.push(entry.reason.clone());
            cells
        })
        .collect();

    headers.push(ERROR_COLUMN.to_string());
    (headers, rows)
}

#[derive(Debug, Clone)]
pub struct FailureRecorder {
    path: PathBuf,
    input: Option<PathBuf>,
}

impl FailureRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            input: None,
        }
    }

    /// Refuse to write over `input`
    pub fn guarding(mut self, input: &Path) -> Self {
        self.input = Some(input.to_path_buf());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the artifact. Does nothing (and returns `None`) when there are
    /// no failures, leaving any earlier artifact untouched.
    pub fn record_failures(
        &self,
        failures: &[FailureEntry],
    ) -> Result<Option<PathBuf>, FailureRecordError> {
        if failures.is_empty() {
            return Ok(None);
        }

        if let Some(input) = &self.input {
            if same_file(input, &self.path) {
                return Err(FailureRecordError::WouldOverwriteInput(self.path.clone()));
            }
        }

        let (headers, rows) = failure_table(failures);
        sheet::write_sheet(&self.path, &headers, &rows)?;
        tracing::warn!(
            "{} failed row(s) written to '{}'",
            failures.len(),
            self.path.display()
        );
        Ok(Some(self.path.clone()))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(fields: &[(&str, &str)], reason: &str) -> FailureEntry {
        FailureEntry {
            source: SourceRecord::new(
                2,
                fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            step: "upsert-api".to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_failure_table_unions_columns() {
        let failures = vec![
            entry(&[("APIName", "A"), ("urlSuffix", "/a")], "boom"),
            entry(&[("APIName", "B"), ("Organization", "Ops")], "bang"),
        ];
        let (headers, rows) = failure_table(&failures);

        assert_eq!(headers, vec!["APIName", "urlSuffix", "Organization", "_error"]);
        assert_eq!(rows[0], vec!["A", "/a", "", "boom"]);
        assert_eq!(rows[1], vec!["B", "", "Ops", "bang"]);
    }

    #[test]
    fn test_no_failures_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.csv");
        let written = FailureRecorder::new(&path).record_failures(&[]).unwrap();
        assert_eq!(written, None);
        assert!(!path.exists());
    }

    #[test]
    fn test_refuses_to_overwrite_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rows.csv");
        std::fs::write(&input, "APIName\nA\n").unwrap();

        let recorder = FailureRecorder::new(&input).guarding(&input);
        let err = recorder
            .record_failures(&[entry(&[("APIName", "A")], "boom")])
            .unwrap_err();
        assert!(matches!(err, FailureRecordError::WouldOverwriteInput(_)));
        assert_eq!(std::fs::read_to_string(&input).unwrap(), "APIName\nA\n");
    }

    #[test]
    fn test_artifact_reads_back_as_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.csv");
        FailureRecorder::new(&path)
            .record_failures(&[entry(&[("APIName", "Weather API"), ("packageName", "Gold, Silver")], "boom")])
            .unwrap();

        let sheet = sheet::read_sheet(&path, 0).unwrap();
        assert_eq!(sheet.headers, vec!["APIName", "packageName"]);
        assert_eq!(sheet.records[0].get("packageName"), Some("Gold, Silver"));
        assert_eq!(sheet.records[0].get(ERROR_COLUMN), None);
    }
}
