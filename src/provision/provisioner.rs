//! Row Provisioner
//!
//! Drives the fixed step sequence for one row:
//!
//! 1. API setup (critical): upsert API, subscription key header, bind to the
//!    self-hosted gateway, unbind from the managed gateway, products
//!    (best-effort per product, critical only if all fail), then tags
//!    (non-critical).
//! 2. Operations (non-critical): for each HTTP method, upsert the operation
//!    and replace its policy.
//!
//! API setup is skipped when the API identity was already set up earlier in
//! the same batch; the operations of the row still run.

use super::error::ProvisionError;
use super::identity::Identity;
use super::outcome::{ProvisioningOutcome, Step, StepLog};
use super::policy::{build_policy, RewriteStyle};
use super::row::RowConfig;
use crate::azure::resources::{
    unbind_managed_gateway, ApiSpec, OperationResponse, OperationSpec, ProductSpec,
    ResourceClient, TemplateParameter,
};
use std::collections::HashSet;

/// Which parts of a row to provision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionMode {
    /// API setup, then operations
    #[default]
    Full,
    /// Operations and policies only; the API must already exist
    OperationsOnly,
}

/// Shape of operation URL templates and their rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationLayout {
    /// Path used as written, parameters required, fixed rewrite target
    #[default]
    Exact,
    /// Directory paths get a trailing `{*path}` wildcard that is appended to
    /// the rewrite base; parameters optional
    Wildcard,
}

impl OperationLayout {
    pub fn url_template(&self, path: &str) -> String {
        match self {
            Self::Exact => path.to_string(),
            Self::Wildcard if path.is_empty() || path.ends_with('/') => {
                format!("{}/{{*path}}", path.trim_end_matches('/'))
            }
            Self::Wildcard => path.to_string(),
        }
    }

    fn rewrite_style(&self) -> RewriteStyle {
        match self {
            Self::Exact => RewriteStyle::Fixed,
            Self::Wildcard => RewriteStyle::WildcardSuffix,
        }
    }

    fn parameter(&self, name: &str) -> TemplateParameter {
        match self {
            Self::Exact => TemplateParameter::string(name, true, name.to_string()),
            Self::Wildcard => TemplateParameter::string(name, false, format!("Parameter {name}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Self-hosted gateway APIs are bound to
    pub gateway_name: String,
    pub mode: ProvisionMode,
    pub layout: OperationLayout,
}

impl ProvisionOptions {
    pub fn new(gateway_name: impl Into<String>) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            mode: ProvisionMode::default(),
            layout: OperationLayout::default(),
        }
    }
}

/// API identities already set up during the current batch
#[derive(Debug, Clone, Default)]
pub struct ProvisionedApis(HashSet<Identity>);

impl ProvisionedApis {
    pub fn contains(&self, api_id: &Identity) -> bool {
        self.0.contains(api_id)
    }

    pub fn insert(&mut self, api_id: Identity) -> bool {
        self.0.insert(api_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Names of the `{param}` / `{*param}` segments of a URL template, in order
pub fn template_parameters(path: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = after[..close].trim_start_matches('*').trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after[close + 1..];
    }
    names
}

pub struct RowProvisioner<'a, C: ResourceClient + ?Sized> {
    client: &'a C,
    options: ProvisionOptions,
}

impl<'a, C: ResourceClient + ?Sized> RowProvisioner<'a, C> {
    pub fn new(client: &'a C, options: ProvisionOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &ProvisionOptions {
        &self.options
    }

    /// Provision one row.
    ///
    /// `provisioned` is checked and updated within this call, so two rows
    /// sharing an API identity set the API up exactly once.
    pub async fn provision_row(
        &self,
        row: RowConfig,
        provisioned: &mut ProvisionedApis,
    ) -> ProvisioningOutcome {
        let mut log = StepLog::new();

        let api_id = match Identity::derive(&row.api_display_name) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(
                    "Failed MAIN API steps for \"{}\" (line {}): {}",
                    row.api_display_name,
                    row.source.line,
                    err
                );
                log.failed(Step::DeriveApiIdentity, &err);
                return ProvisioningOutcome {
                    row,
                    api_id: None,
                    api_reused: false,
                    steps: log.into_records(),
                    error: Some(err),
                };
            }
        };

        let api_reused = match self.options.mode {
            ProvisionMode::OperationsOnly => true,
            ProvisionMode::Full if provisioned.contains(&api_id) => {
                tracing::info!("API '{}' ==> already provisioned in this run, reusing.", api_id);
                true
            }
            ProvisionMode::Full => {
                if let Err(err) = self.setup_api(&api_id, &row, &mut log).await {
                    tracing::error!(
                        "Failed MAIN API steps for \"{}\": {}",
                        row.api_display_name,
                        err
                    );
                    return ProvisioningOutcome {
                        row,
                        api_id: Some(api_id),
                        api_reused: false,
                        steps: log.into_records(),
                        error: Some(err),
                    };
                }
                provisioned.insert(api_id.clone());
                false
            }
        };

        self.provision_operations(&api_id, &row, &mut log).await;
        tracing::info!("Row {} ({}) done.", row.source.line, row.endpoint_name);

        ProvisioningOutcome {
            row,
            api_id: Some(api_id),
            api_reused,
            steps: log.into_records(),
            error: None,
        }
    }

    /// The critical block. Any error returned aborts the row.
    pub async fn setup_api(
        &self,
        api_id: &Identity,
        row: &RowConfig,
        log: &mut StepLog,
    ) -> Result<(), ProvisionError> {
        let id = api_id.as_str();

        if row.service_host.is_empty() {
            let err = ProvisionError::critical(
                Step::UpsertApi.to_string(),
                "backend host (systemDomains) is empty",
            );
            log.failed(Step::UpsertApi, &err);
            return Err(err);
        }
        let spec = ApiSpec {
            display_name: row.api_display_name.clone(),
            path: row.api_path().to_string(),
            protocols: vec!["http".to_string(), "https".to_string()],
            service_url: row.service_url(),
            description: row.description.clone(),
            subscription_required: false,
        };
        self.critical(log, Step::UpsertApi, self.client.upsert_api(id, &spec).await)?;
        tracing::info!("API '{}' ==> created.", id);

        self.critical(
            log,
            Step::SetSubscriptionKeyHeader,
            self.client
                .set_subscription_key_header(id, &row.auth_key_header_name)
                .await,
        )?;
        tracing::info!(
            "Subscription key header updated for API '{}' ==> to {}.",
            id,
            row.auth_key_header_name
        );

        let gateway = self.options.gateway_name.as_str();
        self.critical(
            log,
            Step::BindGateway,
            self.client.bind_gateway(gateway, id).await,
        )?;
        tracing::info!("API '{}' ==> assigned to gateway '{}'.", id, gateway);

        let removed = self.critical(
            log,
            Step::UnbindManagedGateway,
            unbind_managed_gateway(self.client, id).await,
        )?;
        if removed {
            tracing::info!("API '{}' ==> removed from managed gateway.", id);
        } else {
            tracing::info!("'{}' ==> not assigned to managed gateway.", id);
        }

        self.assign_products(api_id, row, log).await?;
        self.assign_tags(api_id, row, log).await;
        Ok(())
    }

    /// Assign the API to every product of the row. One product failing does
    /// not stop the others; the row fails only when none could be assigned.
    async fn assign_products(
        &self,
        api_id: &Identity,
        row: &RowConfig,
        log: &mut StepLog,
    ) -> Result<(), ProvisionError> {
        let mut assigned = 0usize;
        let mut last_error = String::new();

        for name in &row.product_names {
            match self.assign_product(api_id, name).await {
                Ok(product_id) => {
                    assigned += 1;
                    log.succeeded(Step::AssignProduct(product_id));
                }
                Err((step, message)) => {
                    tracing::error!(
                        "Failed to assign API '{}' to product '{}': {}",
                        api_id,
                        name,
                        message
                    );
                    last_error = message.clone();
                    log.failed(step, message);
                }
            }
        }

        if assigned == 0 {
            let err = ProvisionError::critical(
                Step::AssignProducts.to_string(),
                format!(
                    "all {} product assignment(s) failed; last error: {}",
                    row.product_names.len(),
                    last_error
                ),
            );
            log.failed(Step::AssignProducts, &err);
            return Err(err);
        }
        Ok(())
    }

    async fn assign_product(&self, api_id: &Identity, name: &str) -> Result<String, (Step, String)> {
        let product_id = Identity::derive(name)
            .map_err(|e| (Step::AssignProduct(name.to_string()), e.to_string()))?;
        let pid = product_id.as_str();
        let step = || Step::AssignProduct(pid.to_string());

        let existing = self
            .client
            .get_product(pid)
            .await
            .map_err(|e| (step(), format!("failed to ensure product '{pid}': {e}")))?;
        if existing.is_some() {
            tracing::info!("PRODUCT '{}' ==> exists.", pid);
        } else {
            self.client
                .upsert_product(pid, &ProductSpec::auto_created(name))
                .await
                .map_err(|e| (step(), format!("failed to ensure product '{pid}': {e}")))?;
            tracing::info!("PRODUCT '{}' ==> created.", pid);
        }

        self.client
            .assign_product(pid, api_id.as_str())
            .await
            .map_err(|e| (step(), e.to_string()))?;
        tracing::info!("API '{}' ==> assigned to product '{}'.", api_id, pid);
        Ok(product_id.to_string())
    }

    async fn assign_tags(&self, api_id: &Identity, row: &RowConfig, log: &mut StepLog) {
        for tag in &row.tags {
            let result = match Identity::derive(tag) {
                Ok(tag_id) => self.ensure_tag(api_id, &tag_id, tag).await,
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(tag_id) => {
                    tracing::info!("TAG '{}' ==> assigned to API '{}'.", tag_id, api_id);
                    log.succeeded(Step::AssignTag(tag_id));
                }
                Err(message) => {
                    tracing::error!(
                        "Failed to create/assign tag '{}' to API '{}': {}",
                        tag,
                        api_id,
                        message
                    );
                    log.failed(Step::AssignTag(tag.clone()), message);
                }
            }
        }
    }

    async fn ensure_tag(&self, api_id: &Identity, tag_id: &Identity, display_name: &str) -> Result<String, String> {
        let tid = tag_id.as_str();
        self.client
            .upsert_tag(tid, display_name)
            .await
            .map_err(|e| e.to_string())?;
        tracing::info!("TAG '{}' ==> ensured.", tid);
        self.client
            .assign_tag(api_id.as_str(), tid)
            .await
            .map_err(|e| e.to_string())?;
        Ok(tid.to_string())
    }

    /// Upsert one operation per HTTP method and replace its policy. A failing
    /// method is logged and the next one is still attempted.
    pub async fn provision_operations(&self, api_id: &Identity, row: &RowConfig, log: &mut StepLog) {
        let layout = self.options.layout;
        let url_template = layout.url_template(&row.operation_path_template);
        let template_parameters: Vec<TemplateParameter> = template_parameters(&url_template)
            .iter()
            .map(|name| layout.parameter(name))
            .collect();

        for method in &row.http_methods {
            let operation_id = match Identity::derive(&format!("{}-{}", method, row.endpoint_name)) {
                Ok(id) => id,
                Err(err) => {
                    tracing::error!("Failed to derive operation id for {} on API '{}': {}", method, api_id, err);
                    log.failed(Step::UpsertOperation(format!("{method}-{}", row.endpoint_name)), err);
                    continue;
                }
            };
            let op = operation_id.as_str();

            let spec = OperationSpec {
                display_name: row.endpoint_name.clone(),
                method: method.clone(),
                url_template: url_template.clone(),
                responses: vec![OperationResponse::ok()],
                template_parameters: template_parameters.clone(),
            };
            if let Err(err) = self.client.upsert_operation(api_id.as_str(), op, &spec).await {
                tracing::error!(
                    "Failed to create operation/policy '{}' on API '{}': {}",
                    op,
                    api_id,
                    err
                );
                let step = Step::UpsertOperation(op.to_string());
                log.failed(step.clone(), ProvisionError::non_critical(step.to_string(), err.to_string()));
                continue;
            }
            tracing::info!("OPERATION '{}' ==> created with path '{}'.", op, url_template);
            log.succeeded(Step::UpsertOperation(op.to_string()));

            let policy = build_policy(api_id, &operation_id, row, layout.rewrite_style());
            match self.client.put_policy(&policy).await {
                Ok(()) => {
                    tracing::info!("POLICY applied to '{}' ==> ({})", op, method);
                    log.succeeded(Step::ApplyPolicy(op.to_string()));
                }
                Err(err) => {
                    tracing::error!("Failed to apply policy to '{}': {}", op, err);
                    let step = Step::ApplyPolicy(op.to_string());
                    log.failed(step.clone(), ProvisionError::non_critical(step.to_string(), err.to_string()));
                }
            }
        }
    }

    /// Record a critical step, converting its error into a row abort
    fn critical<T, E: std::fmt::Display>(
        &self,
        log: &mut StepLog,
        step: Step,
        result: Result<T, E>,
    ) -> Result<T, ProvisionError> {
        match result {
            Ok(value) => {
                log.succeeded(step);
                Ok(value)
            }
            Err(err) => {
                let err = ProvisionError::critical(step.to_string(), err.to_string());
                log.failed(step, &err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parameters() {
        assert_eq!(template_parameters("/forecast/{city}"), vec!["city"]);
        assert_eq!(
            template_parameters("/a/{x}/b/{y}/{x}"),
            vec!["x".to_string(), "y".to_string()]
        );
        assert_eq!(template_parameters("/items/{*path}"), vec!["path"]);
        assert!(template_parameters("/plain").is_empty());
        assert!(template_parameters("/broken/{oops").is_empty());
    }

    #[test]
    fn test_wildcard_layout() {
        let layout = OperationLayout::Wildcard;
        assert_eq!(layout.url_template("/"), "/{*path}");
        assert_eq!(layout.url_template("/v1/users/"), "/v1/users/{*path}");
        assert_eq!(layout.url_template("/v1/users"), "/v1/users");
        assert_eq!(OperationLayout::Exact.url_template("/"), "/");
    }

    #[test]
    fn test_layout_parameters() {
        let exact = OperationLayout::Exact.parameter("city");
        assert!(exact.required);
        assert_eq!(exact.description, "city");

        let wildcard = OperationLayout::Wildcard.parameter("path");
        assert!(!wildcard.required);
        assert_eq!(wildcard.description, "Parameter path");
    }
}
