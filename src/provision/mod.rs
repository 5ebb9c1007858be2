//! Provisioning core
//!
//! Turns sheet rows into API Management resources.
//!
//! # Architecture
//!
//! - [`identity`] - Display name to resource identity
//! - [`row`] - Typed rows and their validation
//! - [`policy`] - Operation policy synthesis
//! - [`outcome`] - Step records, severities and row outcomes
//! - [`provisioner`] - The per-row step sequence
//! - [`batch`] - Ordered batch execution and deduplication
//! - [`failures`] - Retry artifact for failed rows

pub mod batch;
pub mod error;
pub mod failures;
pub mod identity;
pub mod outcome;
pub mod policy;
pub mod provisioner;
pub mod row;

pub use batch::{load_rows, BatchOrchestrator, BatchReport, BatchSummary};
pub use error::ProvisionError;
pub use failures::{FailureEntry, FailureRecorder};
pub use identity::{sanitize, Identity};
pub use outcome::{ProvisioningOutcome, Severity, Step, StepStatus};
pub use policy::{build_policy, PolicyDocument};
pub use provisioner::{OperationLayout, ProvisionMode, ProvisionOptions, RowProvisioner};
pub use row::RowConfig;
