//! Resource operations consumed by the provisioner
//!
//! One create-or-update verb per resource kind, keyed by identity, plus
//! read-if-exists for products and delete-if-present for gateway bindings.

use super::client::{ApimClient, MANAGED_GATEWAY, TAG_API_VERSION};
use super::http::ApimResult;
use crate::provision::policy::PolicyDocument;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

/// Query parameter name accepted alongside the subscription key header
pub const SUBSCRIPTION_KEY_QUERY: &str = "subscription-key";

/// Properties of an API resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    pub display_name: String,
    pub path: String,
    pub protocols: Vec<String>,
    pub service_url: String,
    pub description: String,
    pub subscription_required: bool,
}

/// Properties of an operation resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSpec {
    pub display_name: String,
    pub method: String,
    pub url_template: String,
    pub responses: Vec<OperationResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub template_parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub status_code: u16,
    pub description: String,
}

impl OperationResponse {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            description: "OK".to_string(),
        }
    }
}

/// A `{name}` segment of an operation URL template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    pub description: String,
}

impl TemplateParameter {
    pub fn string(name: &str, required: bool, description: String) -> Self {
        Self {
            name: name.to_string(),
            param_type: "string".to_string(),
            required,
            description,
        }
    }
}

/// Properties of a product resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSpec {
    pub display_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
    pub subscription_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<bool>,
    pub state: String,
}

impl ProductSpec {
    /// Product created on demand while assigning APIs
    pub fn auto_created(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            description: format!("Auto-created for {display_name}"),
            terms: Some("Auto-generated terms".to_string()),
            subscription_required: false,
            approval_required: None,
            state: "published".to_string(),
        }
    }

    /// Product that carries imported subscription keys
    pub fn keyed(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            description: format!("Product for {display_name}"),
            terms: None,
            subscription_required: true,
            approval_required: Some(false),
            state: "published".to_string(),
        }
    }
}

/// Idempotent resource verbs the provisioner drives
///
/// Every method is safe to repeat with identical inputs.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn upsert_api(&self, api_id: &str, spec: &ApiSpec) -> ApimResult<()>;

    async fn set_subscription_key_header(&self, api_id: &str, header_name: &str) -> ApimResult<()>;

    async fn bind_gateway(&self, gateway_id: &str, api_id: &str) -> ApimResult<()>;

    /// Remove an API from a gateway. Returns `false` when it was not bound.
    async fn unbind_gateway(&self, gateway_id: &str, api_id: &str) -> ApimResult<bool>;

    async fn get_product(&self, product_id: &str) -> ApimResult<Option<Value>>;

    async fn upsert_product(&self, product_id: &str, spec: &ProductSpec) -> ApimResult<()>;

    async fn assign_product(&self, product_id: &str, api_id: &str) -> ApimResult<()>;

    async fn upsert_tag(&self, tag_id: &str, display_name: &str) -> ApimResult<()>;

    async fn assign_tag(&self, api_id: &str, tag_id: &str) -> ApimResult<()>;

    async fn upsert_operation(
        &self,
        api_id: &str,
        operation_id: &str,
        spec: &OperationSpec,
    ) -> ApimResult<()>;

    /// Replace the operation-scoped policy wholesale
    async fn put_policy(&self, policy: &PolicyDocument) -> ApimResult<()>;
}

#[async_trait]
impl ResourceClient for ApimClient {
    async fn upsert_api(&self, api_id: &str, spec: &ApiSpec) -> ApimResult<()> {
        let url = self.service_url(&["apis", api_id])?;
        self.put(&url, Some(&json!({ "properties": spec }))).await?;
        Ok(())
    }

    async fn set_subscription_key_header(&self, api_id: &str, header_name: &str) -> ApimResult<()> {
        let url = self.service_url(&["apis", api_id])?;
        let body = json!({
            "properties": {
                "subscriptionKeyParameterNames": {
                    "header": header_name,
                    "query": SUBSCRIPTION_KEY_QUERY,
                }
            }
        });
        self.patch(&url, &body).await?;
        Ok(())
    }

    async fn bind_gateway(&self, gateway_id: &str, api_id: &str) -> ApimResult<()> {
        let url = self.service_url(&["gateways", gateway_id, "apis", api_id])?;
        self.put(&url, None).await?;
        Ok(())
    }

    async fn unbind_gateway(&self, gateway_id: &str, api_id: &str) -> ApimResult<bool> {
        let url = self.service_url(&["gateways", gateway_id, "apis", api_id])?;
        self.delete_if_exists(&url).await
    }

    async fn get_product(&self, product_id: &str) -> ApimResult<Option<Value>> {
        let url = self.service_url(&["products", product_id])?;
        self.get_if_exists(&url).await
    }

    async fn upsert_product(&self, product_id: &str, spec: &ProductSpec) -> ApimResult<()> {
        let url = self.service_url(&["products", product_id])?;
        self.put(&url, Some(&json!({ "properties": spec }))).await?;
        Ok(())
    }

    async fn assign_product(&self, product_id: &str, api_id: &str) -> ApimResult<()> {
        let url = self.service_url(&["products", product_id, "apis", api_id])?;
        self.put(&url, None).await?;
        Ok(())
    }

    async fn upsert_tag(&self, tag_id: &str, display_name: &str) -> ApimResult<()> {
        let url = self.service_url_with_version(&["tags", tag_id], TAG_API_VERSION)?;
        let body = json!({ "properties": { "displayName": display_name } });
        self.put(&url, Some(&body)).await?;
        Ok(())
    }

    async fn assign_tag(&self, api_id: &str, tag_id: &str) -> ApimResult<()> {
        let url = self.service_url_with_version(&["apis", api_id, "tags", tag_id], TAG_API_VERSION)?;
        self.put(&url, None).await?;
        Ok(())
    }

    async fn upsert_operation(
        &self,
        api_id: &str,
        operation_id: &str,
        spec: &OperationSpec,
    ) -> ApimResult<()> {
        let url = self.service_url(&["apis", api_id, "operations", operation_id])?;
        self.put(&url, Some(&json!({ "properties": spec }))).await?;
        Ok(())
    }

    async fn put_policy(&self, policy: &PolicyDocument) -> ApimResult<()> {
        let url = self.service_url(&[
            "apis",
            &policy.api_id,
            "operations",
            &policy.operation_id,
            "policies",
            "policy",
        ])?;
        let body = json!({
            "properties": {
                "format": "rawxml",
                "value": policy.to_xml(),
            }
        });
        self.put(&url, Some(&body)).await?;
        Ok(())
    }
}

/// Convenience for the managed gateway unbind step
pub async fn unbind_managed_gateway<C: ResourceClient + ?Sized>(
    client: &C,
    api_id: &str,
) -> ApimResult<bool> {
    client.unbind_gateway(MANAGED_GATEWAY, api_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_spec_serializes_camel_case() {
        let spec = OperationSpec {
            display_name: "forecast".to_string(),
            method: "GET".to_string(),
            url_template: "/forecast/{city}".to_string(),
            responses: vec![OperationResponse::ok()],
            template_parameters: vec![TemplateParameter::string("city", true, "city".to_string())],
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["urlTemplate"], "/forecast/{city}");
        assert_eq!(value["responses"][0]["statusCode"], 200);
        assert_eq!(value["templateParameters"][0]["type"], "string");
        assert_eq!(value["templateParameters"][0]["required"], true);
    }

    #[test]
    fn test_operation_spec_omits_empty_parameters() {
        let spec = OperationSpec {
            display_name: "root".to_string(),
            method: "GET".to_string(),
            url_template: "/".to_string(),
            responses: vec![OperationResponse::ok()],
            template_parameters: vec![],
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert!(value.get("templateParameters").is_none());
    }

    #[test]
    fn test_product_specs() {
        let auto = serde_json::to_value(ProductSpec::auto_created("Gold")).unwrap();
        assert_eq!(auto["subscriptionRequired"], false);
        assert_eq!(auto["terms"], "Auto-generated terms");
        assert!(auto.get("approvalRequired").is_none());

        let keyed = serde_json::to_value(ProductSpec::keyed("Gold")).unwrap();
        assert_eq!(keyed["subscriptionRequired"], true);
        assert_eq!(keyed["approvalRequired"], false);
        assert_eq!(keyed["state"], "published");
    }
}
