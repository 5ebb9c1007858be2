//! Bulk provisioning of Azure API Management resources from sheet exports.
//!
//! Each row of the input sheet describes one API endpoint. Rows are turned
//! into APIs, gateway bindings, products, tags, operations and operation
//! policies, in that order, against the management REST API. Re-running a
//! sheet converges to the same remote state; rows that fail are written to
//! a retry sheet of the same shape.

pub mod azure;
pub mod config;
pub mod keys;
pub mod logging;
pub mod provision;
pub mod purge;
pub mod sheet;
