//! API Management Client
//!
//! Main client for the API Management control plane, combining the
//! service coordinates, the bearer token and the HTTP transport.

use super::http::{ApimError, ApimResult, ArmHttpClient};
use crate::config::Settings;
use serde_json::Value;
use url::Url;

/// API version attached to every call except tag calls
pub const API_VERSION: &str = "2022-08-01";

/// Tags are only exposed on the newer API version
pub const TAG_API_VERSION: &str = "2024-05-01";

/// Name of the built-in managed gateway
pub const MANAGED_GATEWAY: &str = "managed";

/// Main API Management client
#[derive(Clone)]
pub struct ApimClient {
    http: ArmHttpClient,
    endpoint: Url,
    token: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub service_name: String,
}

impl std::fmt::Debug for ApimClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApimClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

impl ApimClient {
    /// Create a new client for the service named in `settings`
    pub fn new(settings: &Settings) -> ApimResult<Self> {
        Ok(Self {
            http: ArmHttpClient::new()?,
            endpoint: Url::parse(&settings.management_endpoint)?,
            token: settings.access_token.clone(),
            subscription_id: settings.subscription_id.clone(),
            resource_group: settings.resource_group.clone(),
            service_name: settings.service_name.clone(),
        })
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build a service-scoped resource URL with the default API version
    ///
    /// `segments` are appended after `.../service/{name}/` and are
    /// percent-encoded individually.
    pub fn service_url(&self, segments: &[&str]) -> ApimResult<String> {
        self.service_url_with_version(segments, API_VERSION)
    }

    /// Build a service-scoped resource URL with an explicit API version
    pub fn service_url_with_version(&self, segments: &[&str], version: &str) -> ApimResult<String> {
        let mut url = self.endpoint.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApimError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty().extend([
                "subscriptions",
                self.subscription_id.as_str(),
                "resourceGroups",
                self.resource_group.as_str(),
                "providers",
                "Microsoft.ApiManagement",
                "service",
                self.service_name.as_str(),
            ]);
            path.extend(segments);
        }
        url.query_pairs_mut().append_pair("api-version", version);
        Ok(url.into())
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    pub async fn get(&self, url: &str) -> ApimResult<Value> {
        self.http.get(url, &self.token).await
    }

    pub async fn put(&self, url: &str, body: Option<&Value>) -> ApimResult<Value> {
        self.http.put(url, &self.token, body).await
    }

    pub async fn patch(&self, url: &str, body: &Value) -> ApimResult<Value> {
        self.http.patch(url, &self.token, body).await
    }

    pub async fn delete(&self, url: &str) -> ApimResult<Value> {
        self.http.delete(url, &self.token).await
    }

    /// GET that maps 404 to `None`
    pub async fn get_if_exists(&self, url: &str) -> ApimResult<Option<Value>> {
        match self.get(url).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// DELETE that treats 404 as success; returns whether anything was removed
    pub async fn delete_if_exists(&self, url: &str) -> ApimResult<bool> {
        match self.delete(url).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// List a collection, following `nextLink` until exhausted
    pub async fn list(&self, collection: &str) -> ApimResult<Vec<Value>> {
        let mut all_items = Vec::new();
        let mut next = Some(self.service_url(&[collection])?);

        while let Some(url) = next.take() {
            let page = self.get(&url).await?;
            if let Some(items) = page.get("value").and_then(Value::as_array) {
                all_items.extend(items.iter().cloned());
            }
            next = page
                .get("nextLink")
                .and_then(Value::as_str)
                .filter(|link| !link.is_empty())
                .map(str::to_string);
        }

        Ok(all_items)
    }
}

/// Resource name (`name` field) of an ARM list entry
pub fn resource_name(item: &Value) -> Option<&str> {
    item.get("name").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApimClient {
        let settings = Settings {
            subscription_id: "sub-1".to_string(),
            resource_group: "rg-1".to_string(),
            service_name: "apim-1".to_string(),
            access_token: "token".to_string(),
            sheet_index: 0,
            gateway_name: "gw".to_string(),
            management_endpoint: "https://management.azure.com".to_string(),
        };
        ApimClient::new(&settings).unwrap()
    }

    #[test]
    fn test_service_url() {
        let url = client().service_url(&["apis", "weather-api"]).unwrap();
        assert_eq!(
            url,
            "https://management.azure.com/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.ApiManagement/service/apim-1/apis/weather-api?api-version=2022-08-01"
        );
    }

    #[test]
    fn test_service_url_encodes_segments() {
        let url = client()
            .service_url_with_version(&["tags", "a b/c"], TAG_API_VERSION)
            .unwrap();
        assert!(url.ends_with("/tags/a%20b%2Fc?api-version=2024-05-01"));
    }

    #[test]
    fn test_debug_hides_token() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("token"));
    }
}
