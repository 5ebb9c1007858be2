//! Batch Orchestrator
//!
//! Runs rows strictly in input order. The first row of an API identity sets
//! the API up; later rows with the same identity only add their operations.
//! A row that fails its API setup is recorded and skipped, and the batch
//! moves on.

use super::failures::{FailureEntry, FailureRecordError, FailureRecorder};
use super::outcome::ProvisioningOutcome;
use super::provisioner::{ProvisionOptions, ProvisionedApis, RowProvisioner};
use super::row::{RowConfig, RowError};
use crate::azure::resources::ResourceClient;
use crate::sheet::{Sheet, SourceRecord};
use std::path::PathBuf;

/// A record that could not be turned into a [`RowConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub record: SourceRecord,
    pub error: RowError,
}

pub type LoadedRow = Result<RowConfig, RejectedRow>;

/// Map every record of a sheet, keeping rejects in place
pub fn load_rows(sheet: &Sheet) -> Vec<LoadedRow> {
    sheet
        .records
        .iter()
        .map(|record| {
            RowConfig::from_record(record).map_err(|error| RejectedRow {
                record: record.clone(),
                error,
            })
        })
        .collect()
}

/// State owned by one batch run
#[derive(Debug, Default)]
pub struct BatchContext {
    pub provisioned: ProvisionedApis,
    pub failures: Vec<FailureEntry>,
}

impl BatchContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Totals of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub rows: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rejected: usize,
    pub apis_created: usize,
    pub apis_reused: usize,
    /// Failed tag, product, operation and policy steps of rows that succeeded
    pub skipped_steps: usize,
}

impl BatchSummary {
    fn count(&mut self, outcome: &ProvisioningOutcome) {
        self.rows += 1;
        if outcome.succeeded() {
            self.succeeded += 1;
            if outcome.api_reused {
                self.apis_reused += 1;
            } else {
                self.apis_created += 1;
            }
            self.skipped_steps += outcome.skipped_steps().count();
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<ProvisioningOutcome>,
    pub summary: BatchSummary,
    pub failures: Vec<FailureEntry>,
    /// Where failures were written, if there were any
    pub failure_artifact: Option<PathBuf>,
}

pub struct BatchOrchestrator<'a, C: ResourceClient + ?Sized> {
    provisioner: RowProvisioner<'a, C>,
    context: BatchContext,
    outcomes: Vec<ProvisioningOutcome>,
    summary: BatchSummary,
}

impl<'a, C: ResourceClient + ?Sized> BatchOrchestrator<'a, C> {
    /// Start a batch with a fresh context
    pub fn new(client: &'a C, options: ProvisionOptions) -> Self {
        Self {
            provisioner: RowProvisioner::new(client, options),
            context: BatchContext::new(),
            outcomes: Vec::new(),
            summary: BatchSummary::default(),
        }
    }

    pub fn context(&self) -> &BatchContext {
        &self.context
    }

    /// Provision rows in order and return their outcomes
    pub async fn run_batch(&mut self, rows: Vec<RowConfig>) -> &[ProvisioningOutcome] {
        self.run(rows.into_iter().map(Ok).collect()).await
    }

    /// Like [`Self::run_batch`], with rows rejected at load time recorded in place
    pub async fn run(&mut self, rows: Vec<LoadedRow>) -> &[ProvisioningOutcome] {
        let start = self.outcomes.len();
        let total = rows.len();
        let options = self.provisioner.options();
        tracing::info!(
            "Provisioning {} row(s) ({:?}, {:?} layout, gateway '{}')",
            total,
            options.mode,
            options.layout,
            options.gateway_name
        );

        for (index, loaded) in rows.into_iter().enumerate() {
            let row = match loaded {
                Ok(row) => row,
                Err(rejected) => {
                    tracing::error!(
                        "Skipping line {}: {}",
                        rejected.record.line,
                        rejected.error
                    );
                    self.summary.rejected += 1;
                    self.context
                        .failures
                        .push(FailureEntry::rejected(rejected.record, &rejected.error));
                    continue;
                }
            };

            tracing::info!(
                "[{}/{}] {} ({})",
                index + 1,
                total,
                row.api_display_name,
                row.endpoint_name
            );
            let outcome = self
                .provisioner
                .provision_row(row, &mut self.context.provisioned)
                .await;

            if let Some(entry) = FailureEntry::from_outcome(&outcome) {
                self.context.failures.push(entry);
            }
            self.summary.count(&outcome);
            self.outcomes.push(outcome);
        }

        &self.outcomes[start..]
    }

    /// Hand the failures to the recorder and close the batch
    pub fn finish(self, recorder: &FailureRecorder) -> Result<BatchReport, FailureRecordError> {
        let summary = self.summary;
        tracing::info!(
            "Batch complete: {} row(s), {} succeeded, {} failed, {} rejected; {} API(s) set up, {} reused; {} step(s) skipped",
            summary.rows + summary.rejected,
            summary.succeeded,
            summary.failed,
            summary.rejected,
            summary.apis_created,
            summary.apis_reused,
            summary.skipped_steps
        );

        let failure_artifact = recorder.record_failures(&self.context.failures)?;
        Ok(BatchReport {
            outcomes: self.outcomes,
            summary,
            failures: self.context.failures,
            failure_artifact,
        })
    }
}
