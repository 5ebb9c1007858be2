//! Provisioning error taxonomy

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    /// A display name had nothing to derive an identity from.
    #[error("cannot derive a resource identity from '{0}'")]
    InvalidIdentitySource(String),

    /// A step of the API setup failed; the rest of the row is abandoned.
    #[error("{step} failed: {message}")]
    CriticalStepFailure { step: String, message: String },

    /// A tag, operation or policy step failed; siblings still run.
    #[error("{step} failed: {message}")]
    NonCriticalStepFailure { step: String, message: String },

    /// The run cannot start at all (missing credential, unreadable input).
    #[error("{0}")]
    BatchFatal(String),
}

impl ProvisionError {
    pub fn critical(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CriticalStepFailure {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn non_critical(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NonCriticalStepFailure {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl From<crate::config::ConfigError> for ProvisionError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::BatchFatal(err.to_string())
    }
}
