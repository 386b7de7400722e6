//! Realm Backup - Keycloak realm export and restore
//!
//! Snapshots a realm's configuration graph (clients, roles with composites,
//! groups, identity providers, client scopes, users with their bindings)
//! into a portable backup and replays it into a new realm in dependency
//! order.

pub mod config;
pub mod domain;
pub mod error;
pub mod keycloak;
pub mod policy;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
