//! API Management control-plane interaction
//!
//! This module provides everything needed to talk to the Azure Resource
//! Manager endpoints of one API Management service.
//!
//! # Module Structure
//!
//! - [`http`] - HTTP transport for authenticated JSON calls
//! - [`client`] - Service-scoped client with URL builders and verbs
//! - [`resources`] - The [`resources::ResourceClient`] verbs used while provisioning
//!
//! # Example
//!
//! ```ignore
//! use apimprov::azure::client::ApimClient;
//!
//! async fn example(settings: &apimprov::config::Settings) -> anyhow::Result<()> {
//!     let client = ApimClient::new(settings)?;
//!     let apis = client.list("apis").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod resources;

pub use client::ApimClient;
pub use http::{ApimError, ApimResult};
pub use resources::ResourceClient;
