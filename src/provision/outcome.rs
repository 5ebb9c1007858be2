//! Per-step and per-row results
//!
//! Every step the provisioner attempts leaves a [`StepRecord`]. A step's
//! [`Severity`] names the tier the provisioner runs it in; failed records of
//! the non-critical tiers are what [`ProvisioningOutcome::skipped_steps`]
//! reports.

use super::error::ProvisionError;
use super::identity::Identity;
use super::row::RowConfig;
use std::fmt;

/// What a failure of a step means for its row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the row
    Critical,
    /// Skip this item; the row only fails if every sibling fails too
    BestEffortMulti,
    /// Log and keep going
    NonCritical,
}

/// A provisioning action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    LoadRow,
    DeriveApiIdentity,
    UpsertApi,
    SetSubscriptionKeyHeader,
    BindGateway,
    UnbindManagedGateway,
    AssignProduct(String),
    /// Aggregate of all product assignments of a row
    AssignProducts,
    AssignTag(String),
    UpsertOperation(String),
    ApplyPolicy(String),
}

impl Step {
    pub fn severity(&self) -> Severity {
        match self {
            Self::AssignProduct(_) => Severity::BestEffortMulti,
            Self::AssignTag(_) | Self::UpsertOperation(_) | Self::ApplyPolicy(_) => {
                Severity::NonCritical
            }
            _ => Severity::Critical,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadRow => f.write_str("load-row"),
            Self::DeriveApiIdentity => f.write_str("derive-api-identity"),
            Self::UpsertApi => f.write_str("upsert-api"),
            Self::SetSubscriptionKeyHeader => f.write_str("set-subscription-key-header"),
            Self::BindGateway => f.write_str("bind-gateway"),
            Self::UnbindManagedGateway => f.write_str("unbind-managed-gateway"),
            Self::AssignProduct(p) => write!(f, "assign-product:{p}"),
            Self::AssignProducts => f.write_str("assign-products"),
            Self::AssignTag(t) => write!(f, "assign-tag:{t}"),
            Self::UpsertOperation(o) => write!(f, "upsert-operation:{o}"),
            Self::ApplyPolicy(o) => write!(f, "apply-policy:{o}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
}

impl StepRecord {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, StepStatus::Failed(_))
    }
}

/// Ordered record of the steps attempted for one row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepLog {
    records: Vec<StepRecord>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&mut self, step: Step) {
        self.records.push(StepRecord {
            step,
            status: StepStatus::Succeeded,
        });
    }

    pub fn failed(&mut self, step: Step, reason: impl fmt::Display) {
        self.records.push(StepRecord {
            step,
            status: StepStatus::Failed(reason.to_string()),
        });
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }
}

/// Terminal result of one row
#[derive(Debug, Clone)]
pub struct ProvisioningOutcome {
    pub row: RowConfig,
    pub api_id: Option<Identity>,
    /// The API was set up by an earlier row of the same batch
    pub api_reused: bool,
    pub steps: Vec<StepRecord>,
    /// Set when the row was aborted
    pub error: Option<ProvisionError>,
}

impl ProvisioningOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Name of the step that aborted the row
    pub fn failed_step(&self) -> Option<String> {
        match self.error.as_ref()? {
            ProvisionError::CriticalStepFailure { step, .. }
            | ProvisionError::NonCriticalStepFailure { step, .. } => Some(step.clone()),
            ProvisionError::InvalidIdentitySource(_) => Some(Step::DeriveApiIdentity.to_string()),
            ProvisionError::BatchFatal(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Failed steps that did not abort the row
    pub fn skipped_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|r| r.is_failure() && r.step.severity() != Severity::Critical)
    }

    /// Whether a given step was attempted and succeeded
    pub fn step_succeeded(&self, step: &Step) -> bool {
        self.steps
            .iter()
            .any(|r| &r.step == step && r.status == StepStatus::Succeeded)
    }

    pub fn attempted(&self, step: &Step) -> bool {
        self.steps.iter().any(|r| &r.step == step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_tiers() {
        assert_eq!(Step::UpsertApi.severity(), Severity::Critical);
        assert_eq!(Step::UnbindManagedGateway.severity(), Severity::Critical);
        assert_eq!(
            Step::AssignProduct("gold".into()).severity(),
            Severity::BestEffortMulti
        );
        assert_eq!(Step::AssignTag("x".into()).severity(), Severity::NonCritical);
        assert_eq!(
            Step::ApplyPolicy("get-x".into()).severity(),
            Severity::NonCritical
        );
    }

    #[test]
    fn test_step_names() {
        assert_eq!(Step::UpsertApi.to_string(), "upsert-api");
        assert_eq!(
            Step::UpsertOperation("get-forecast".into()).to_string(),
            "upsert-operation:get-forecast"
        );
    }

    #[test]
    fn test_skipped_steps_exclude_critical_failures() {
        let mut log = StepLog::new();
        log.succeeded(Step::UpsertApi);
        log.failed(Step::AssignProduct("gold".into()), "404");
        log.failed(Step::ApplyPolicy("get-x".into()), "400");
        log.failed(Step::BindGateway, "500");

        let row = RowConfig::from_record(&crate::sheet::SourceRecord::new(
            2,
            vec![("APIName".to_string(), "Orders".to_string())],
        ))
        .unwrap();
        let outcome = ProvisioningOutcome {
            row,
            api_id: None,
            api_reused: false,
            steps: log.into_records(),
            error: Some(ProvisionError::critical("bind-gateway", "500")),
        };

        let skipped: Vec<String> = outcome.skipped_steps().map(|r| r.step.to_string()).collect();
        assert_eq!(skipped, vec!["assign-product:gold", "apply-policy:get-x"]);
        assert_eq!(outcome.failed_step().as_deref(), Some("bind-gateway"));
        assert_eq!(outcome.error_message().as_deref(), Some("bind-gateway failed: 500"));
    }

    #[test]
    fn test_step_log() {
        let mut log = StepLog::new();
        log.succeeded(Step::UpsertApi);
        log.failed(Step::AssignTag("ops".into()), "409 conflict");
        assert_eq!(log.records().len(), 2);
        assert!(log.records()[1].is_failure());
        assert_eq!(
            log.records()[1].status,
            StepStatus::Failed("409 conflict".to_string())
        );
    }
}
