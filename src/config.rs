//! Configuration Management
//!
//! Reads the control-plane target and credentials from the environment
//! (optionally seeded from a `.env` file).

use thiserror::Error;

/// Default self-hosted gateway APIs are bound to
pub const DEFAULT_GATEWAY: &str = "swarm-vm-gw";

/// Default Azure Resource Manager endpoint
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is missing.")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything a run needs to reach the API Management service
#[derive(Debug, Clone)]
pub struct Settings {
    pub subscription_id: String,
    pub resource_group: String,
    pub service_name: String,
    pub access_token: String,
    /// Index of the sheet to read from the input workbook
    pub sheet_index: usize,
    /// Self-hosted gateway every provisioned API is bound to
    pub gateway_name: String,
    pub management_endpoint: String,
}

impl Settings {
    /// Load settings from the process environment, reading `.env` first if present
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        // The token is checked first so a missing credential is reported as such
        let access_token = required("AZURE_ACCESS_TOKEN")?;

        let sheet_index = match get("SHEET_NUM") {
            Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                name: "SHEET_NUM",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => 0,
        };

        Ok(Self {
            subscription_id: required("SUBSCRIPTION_ID")?,
            resource_group: required("RESOURCE_GROUP")?,
            service_name: required("APIM_NAME")?,
            access_token,
            sheet_index,
            gateway_name: get("SELF_HOSTED_GATEWAY").unwrap_or_else(|| DEFAULT_GATEWAY.to_string()),
            management_endpoint: get("AZURE_MANAGEMENT_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string()),
        })
    }
}
