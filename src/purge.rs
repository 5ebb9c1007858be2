//! Bulk delete of APIs or products

use crate::azure::client::{resource_name, ApimClient};
use anyhow::{Context, Result};

/// Collection that can be purged
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PurgeTarget {
    Apis,
    Products,
}

impl PurgeTarget {
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Apis => "apis",
            Self::Products => "products",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub found: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete every resource of a collection; one failed delete does not stop the rest
pub async fn purge(client: &ApimClient, target: PurgeTarget) -> Result<PurgeSummary> {
    let collection = target.collection();
    let items = client
        .list(collection)
        .await
        .with_context(|| format!("Failed to fetch {collection} list"))?;

    let mut summary = PurgeSummary {
        found: items.len(),
        ..Default::default()
    };
    if items.is_empty() {
        tracing::info!("No {} found to delete.", collection);
        return Ok(summary);
    }
    tracing::info!("Found {} {}. Starting deletion...", items.len(), collection);

    for item in &items {
        let Some(name) = resource_name(item) else {
            tracing::warn!("Skipping {} entry without a name: {}", collection, item);
            summary.failed += 1;
            continue;
        };
        let result = match client.service_url(&[collection, name]) {
            Ok(url) => client.delete(&url).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(_) => {
                tracing::info!("Deleted {}: {}", collection, name);
                summary.deleted += 1;
            }
            Err(err) => {
                tracing::error!("Failed to delete {} '{}': {}", collection, name, err);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
