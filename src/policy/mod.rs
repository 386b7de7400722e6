//! Classification policy for default/system roles and sensitive clients.

use crate::config::ClassificationConfig;
use crate::error::{AppError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

type RolePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;
type ClientPredicate = Box<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Prefix of the per-realm composite default role
const DEFAULT_ROLES_PREFIX: &str = "default-roles-";

const BUILTIN_DEFAULT_ROLES: [&str; 2] = ["offline_access", "uma_authorization"];

const GENERIC_ROLES: [&str; 2] = ["user", "admin"];

const BUILTIN_SENSITIVE_CLIENTS: [&str; 4] =
    ["master-realm", "security-admin-console", "admin-cli", "broker"];

/// Two predicates deciding what the importer must never recreate or assign.
pub struct ClassificationPolicy {
    is_default_role: RolePredicate,
    is_sensitive_client: ClientPredicate,
}

impl ClassificationPolicy {
    pub fn new<R, C>(is_default_role: R, is_sensitive_client: C) -> Self
    where
        R: Fn(&str) -> bool + Send + Sync + 'static,
        C: Fn(Option<&str>) -> bool + Send + Sync + 'static,
    {
        Self {
            is_default_role: Box::new(is_default_role),
            is_sensitive_client: Box::new(is_sensitive_client),
        }
    }

    /// Build the production policy. Fails on an invalid role pattern.
    pub fn from_config(config: &ClassificationConfig) -> Result<Self> {
        let patterns = config
            .default_role_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    AppError::BadRequest(format!("Invalid default role pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let exclude_generic = config.exclude_generic_roles;

        let extra_clients: HashSet<String> = config.sensitive_clients.iter().cloned().collect();

        Ok(Self::new(
            move |name| {
                is_builtin_default_role(name)
                    || (exclude_generic && GENERIC_ROLES.contains(&name))
                    || patterns.iter().any(|p| p.is_match(name))
            },
            sensitive_client_predicate(extra_clients),
        ))
    }

    /// Realm roles the directory creates together with every realm. These
    /// are never recreated from a backup, whatever the import mode.
    pub fn is_builtin_realm_role(&self, name: &str) -> bool {
        name.starts_with(DEFAULT_ROLES_PREFIX) || BUILTIN_DEFAULT_ROLES.contains(&name)
    }

    pub fn is_default_role(&self, name: &str) -> bool {
        (self.is_default_role)(name)
    }

    pub fn is_sensitive_client(&self, client_id: Option<&str>) -> bool {
        (self.is_sensitive_client)(client_id)
    }
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::new(
            is_builtin_default_role,
            sensitive_client_predicate(HashSet::new()),
        )
    }
}

impl fmt::Debug for ClassificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationPolicy").finish_non_exhaustive()
    }
}

fn sensitive_client_predicate(
    extra_clients: HashSet<String>,
) -> impl Fn(Option<&str>) -> bool + Send + Sync + 'static {
    move |client_id| match client_id.map(str::trim) {
        None | Some("") => true,
        Some(id) => BUILTIN_SENSITIVE_CLIENTS.contains(&id) || extra_clients.contains(id),
    }
}

fn is_builtin_default_role(name: &str) -> bool {
    name.starts_with(DEFAULT_ROLES_PREFIX)
        || BUILTIN_DEFAULT_ROLES.contains(&name)
        || name.contains("-default")
}
