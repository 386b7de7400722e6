//! Single-collection exports

use super::records::{
    ClientRecord, ClientScopeRecord, GroupRecord, IdentityProviderRecord, RoleRecord, UserRecord,
    UserWithRolesRecord,
};
use crate::error::AppError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Collections that can be exported on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Clients,
    Users,
    Roles,
    Groups,
    IdentityProviders,
    ClientScopes,
    UsersWithRoles,
}

impl ElementKind {
    pub const ALL: [ElementKind; 7] = [
        ElementKind::Clients,
        ElementKind::Users,
        ElementKind::Roles,
        ElementKind::Groups,
        ElementKind::IdentityProviders,
        ElementKind::ClientScopes,
        ElementKind::UsersWithRoles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Clients => "clients",
            ElementKind::Users => "users",
            ElementKind::Roles => "roles",
            ElementKind::Groups => "groups",
            ElementKind::IdentityProviders => "identityProviders",
            ElementKind::ClientScopes => "clientScopes",
            ElementKind::UsersWithRoles => "usersWithRoles",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = AppError;

    /// Case-insensitive; accepts the camelCase archive key or a
    /// kebab/snake spelling (`identity-providers`, `client_scopes`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();

        ElementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == normalized)
            .ok_or_else(|| AppError::BadRequest(format!("Unsupported element type: {}", s)))
    }
}

/// One exported collection, serialized as a bare JSON array
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ElementExport {
    Clients(Vec<ClientRecord>),
    Users(Vec<UserRecord>),
    Roles(Vec<RoleRecord>),
    Groups(Vec<GroupRecord>),
    IdentityProviders(Vec<IdentityProviderRecord>),
    ClientScopes(Vec<ClientScopeRecord>),
    UsersWithRoles(Vec<UserWithRolesRecord>),
}

impl ElementExport {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementExport::Clients(_) => ElementKind::Clients,
            ElementExport::Users(_) => ElementKind::Users,
            ElementExport::Roles(_) => ElementKind::Roles,
            ElementExport::Groups(_) => ElementKind::Groups,
            ElementExport::IdentityProviders(_) => ElementKind::IdentityProviders,
            ElementExport::ClientScopes(_) => ElementKind::ClientScopes,
            ElementExport::UsersWithRoles(_) => ElementKind::UsersWithRoles,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ElementExport::Clients(v) => v.len(),
            ElementExport::Users(v) => v.len(),
            ElementExport::Roles(v) => v.len(),
            ElementExport::Groups(v) => v.len(),
            ElementExport::IdentityProviders(v) => v.len(),
            ElementExport::ClientScopes(v) => v.len(),
            ElementExport::UsersWithRoles(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
