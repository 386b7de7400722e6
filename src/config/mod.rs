//! Configuration management for realm backup and restore

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Keycloak configuration
    pub keycloak: KeycloakConfig,
    /// Backup output configuration
    pub backup: BackupConfig,
    /// Default-role / sensitive-client classification
    pub classification: ClassificationConfig,
    /// Logging configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server (e.g., http://keycloak:8080)
    pub url: String,
    /// Realm the admin credentials authenticate against
    pub admin_realm: String,
    pub admin_client_id: String,
    /// Only sent when non-empty (confidential admin clients)
    pub admin_client_secret: String,
    pub admin_username: String,
    pub admin_password: String,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Default directory for written backups
    pub backup_dir: PathBuf,
    /// Page size used when listing users
    pub users_page_size: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("./backups"),
            users_page_size: 1000,
        }
    }
}

/// Inputs for the default-role and sensitive-client predicates
#[derive(Debug, Clone, Default)]
pub struct ClassificationConfig {
    /// Also treat roles literally named "user" and "admin" as default roles
    pub exclude_generic_roles: bool,
    /// Extra regular expressions matched against role names
    pub default_role_patterns: Vec<String>,
    /// Extra clientIds that must never be recreated
    pub sensitive_clients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            keycloak: KeycloakConfig {
                url: or("KEYCLOAK_URL", "http://localhost:8080")
                    .trim_end_matches('/')
                    .to_string(),
                admin_realm: or("KEYCLOAK_ADMIN_REALM", "master"),
                admin_client_id: or("KEYCLOAK_ADMIN_CLIENT_ID", "admin-cli"),
                admin_client_secret: or("KEYCLOAK_ADMIN_CLIENT_SECRET", ""),
                admin_username: or("KEYCLOAK_ADMIN", "admin"),
                admin_password: or("KEYCLOAK_ADMIN_PASSWORD", "admin"),
                timeout_secs: var("KEYCLOAK_TIMEOUT_SECS")
                    .map(|s| s.parse())
                    .transpose()
                    .context("Invalid KEYCLOAK_TIMEOUT_SECS")?,
            },
            backup: BackupConfig {
                backup_dir: PathBuf::from(or("BACKUP_DIR", "./backups")),
                users_page_size: or("BACKUP_USERS_PAGE_SIZE", "1000")
                    .parse()
                    .context("Invalid BACKUP_USERS_PAGE_SIZE")?,
            },
            classification: ClassificationConfig {
                exclude_generic_roles: var("IMPORT_EXCLUDE_GENERIC_ROLES")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
                default_role_patterns: split_list(var("IMPORT_DEFAULT_ROLE_PATTERNS")),
                sensitive_clients: split_list(var("IMPORT_SENSITIVE_CLIENTS")),
            },
            telemetry: TelemetryConfig {
                log_format: or("LOG_FORMAT", "text"),
            },
        })
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|s| {
            s.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
