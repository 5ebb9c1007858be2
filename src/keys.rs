//! Subscription key import
//!
//! Each input row names a product (`packageName`) and an existing key
//! (`apikey`). The product is created or refreshed, then the subscription
//! scoped to it takes the key as its primary key.

use crate::azure::client::{resource_name, ApimClient};
use crate::azure::resources::{ProductSpec, ResourceClient};
use crate::provision::Identity;
use crate::sheet::Sheet;
use anyhow::{Context, Result};
use serde_json::{json, Value};

pub const PACKAGE_COLUMN: &str = "packageName";
pub const KEY_COLUMN: &str = "apikey";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyImportSummary {
    pub updated: usize,
    pub not_found: usize,
    pub failed: usize,
}

/// Product id at the end of a subscription scope
/// (`.../products/{productId}`), if the scope is product-scoped
pub fn scope_product(scope: &str) -> Option<&str> {
    let (_, rest) = scope.split_once("/products/")?;
    let id = rest.split('/').next().unwrap_or_default();
    (!id.is_empty()).then_some(id)
}

/// Whether a subscription belongs to the product, by scope or by display name
pub fn matches_product(subscription: &Value, package_name: &str, product_id: &str) -> bool {
    let props = subscription.get("properties");
    let field = |name: &str| props.and_then(|p| p.get(name)).and_then(Value::as_str);

    if let Some(scoped) = field("scope").and_then(scope_product) {
        if scoped.eq_ignore_ascii_case(product_id) || scoped.eq_ignore_ascii_case(package_name) {
            return true;
        }
    }
    field("displayName")
        .map(|d| d.trim().eq_ignore_ascii_case(package_name))
        .unwrap_or(false)
}

/// Run the import over every row of the sheet
pub async fn import_keys(client: &ApimClient, sheet: &Sheet) -> Result<KeyImportSummary> {
    if sheet.records.is_empty() {
        tracing::warn!("Sheet '{}' has no rows.", sheet.path.display());
        return Ok(KeyImportSummary::default());
    }

    let subscriptions = client
        .list("subscriptions")
        .await
        .context("Failed to fetch subscriptions list")?;
    tracing::info!("Loaded {} subscription(s)", subscriptions.len());

    let mut summary = KeyImportSummary::default();

    for record in &sheet.records {
        let (Some(package_name), Some(api_key)) = (record.get(PACKAGE_COLUMN), record.get(KEY_COLUMN)) else {
            tracing::warn!("Skipping line {}: missing packageName or apikey", record.line);
            summary.failed += 1;
            continue;
        };

        let product_id = match Identity::derive(package_name) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!("Skipping line {}: {}", record.line, err);
                summary.failed += 1;
                continue;
            }
        };

        if let Err(err) = ensure_keyed_product(client, product_id.as_str(), package_name).await {
            tracing::error!("Failed to create/update product '{}': {:#}", package_name, err);
            summary.failed += 1;
            continue;
        }

        let Some(subscription_id) = subscriptions
            .iter()
            .find(|s| matches_product(s, package_name, product_id.as_str()))
            .and_then(resource_name)
        else {
            tracing::warn!("No subscription found matching '{}'", package_name);
            summary.not_found += 1;
            continue;
        };

        match update_subscription_key(client, subscription_id, api_key, package_name).await {
            Ok(()) => {
                tracing::info!(
                    "Updated subscription '{}' (display: '{}')",
                    subscription_id,
                    package_name
                );
                summary.updated += 1;
            }
            Err(err) => {
                tracing::error!("Failed to update subscription '{}': {:#}", subscription_id, err);
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        "Key import summary: updated {}, not found {}, failed {}",
        summary.updated,
        summary.not_found,
        summary.failed
    );
    Ok(summary)
}

async fn ensure_keyed_product(client: &ApimClient, product_id: &str, display_name: &str) -> Result<()> {
    let existing = client.get_product(product_id).await?;
    client
        .upsert_product(product_id, &ProductSpec::keyed(display_name))
        .await?;
    if existing.is_some() {
        tracing::info!("Updated product '{}' with displayName: '{}'", product_id, display_name);
    } else {
        tracing::info!("Created product: '{}'", display_name);
    }
    Ok(())
}

async fn update_subscription_key(
    client: &ApimClient,
    subscription_id: &str,
    api_key: &str,
    display_name: &str,
) -> Result<()> {
    let url = client.service_url(&["subscriptions", subscription_id])?;
    let body = json!({
        "properties": {
            "primaryKey": api_key,
            "displayName": display_name,
        }
    });
    client.patch(&url, &body).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_product() {
        assert_eq!(
            scope_product("/subscriptions/s/resourceGroups/rg/providers/Microsoft.ApiManagement/service/a/products/gold"),
            Some("gold")
        );
        assert_eq!(scope_product("/subscriptions/s/.../apis/orders"), None);
        assert_eq!(scope_product("/products/"), None);
    }

    #[test]
    fn test_matches_by_scope_or_display_name() {
        let by_scope = json!({
            "name": "sub-1",
            "properties": { "scope": "/x/products/gold-tier", "displayName": "something" }
        });
        assert!(matches_product(&by_scope, "Gold Tier", "gold-tier"));

        let by_name = json!({
            "name": "sub-2",
            "properties": { "scope": "/x/apis/orders", "displayName": " gold tier " }
        });
        assert!(matches_product(&by_name, "Gold Tier", "gold-tier"));

        let neither = json!({ "name": "sub-3", "properties": { "scope": "/x/products/silver" } });
        assert!(!matches_product(&neither, "Gold Tier", "gold-tier"));
    }
}
