//! Import outcome: per-stage results and unresolved references

use crate::error::AppError;
use serde::Serialize;
use std::fmt;

/// Import stages after base-realm creation, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ClientScopes,
    Clients,
    Roles,
    RoleComposites,
    IdentityProviders,
    Groups,
    Users,
    RoleBindings,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ClientScopes => "client scopes",
            Stage::Clients => "clients",
            Stage::Roles => "roles",
            Stage::RoleComposites => "role composites",
            Stage::IdentityProviders => "identity providers",
            Stage::Groups => "groups",
            Stage::Users => "users",
            Stage::RoleBindings => "role bindings",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Imported,
    /// Realm was already present and skip-existing was requested
    SkippedExisting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub name: String,
    pub reason: String,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub created: Vec<String>,
    pub skipped: Vec<SkippedItem>,
    pub failed: Vec<SkippedItem>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            created: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn created(&mut self, name: impl Into<String>) {
        self.created.push(name.into());
    }

    pub fn skipped(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedItem {
            name: name.into(),
            reason: reason.into(),
        });
    }

    /// Record a failed create. A conflict means the item is already
    /// present and counts as skipped.
    pub fn failed(&mut self, name: impl Into<String>, error: &AppError) {
        if error.is_conflict() {
            self.skipped(name, "already exists");
        } else {
            self.failed.push(SkippedItem {
                name: name.into(),
                reason: error.to_string(),
            });
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    User,
    Client,
    RealmRole,
    ClientRole,
    Group,
}

/// A by-name reference that could not be resolved in the target realm
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedReference {
    /// Role or user that holds the reference
    pub owner: String,
    pub kind: ReferenceKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl UnresolvedReference {
    pub fn new(owner: &str, kind: ReferenceKind, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            kind,
            name: name.to_string(),
            client_id: None,
        }
    }

    pub fn client_role(owner: &str, client_id: &str, name: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            ..Self::new(owner, ReferenceKind::ClientRole, name)
        }
    }
}

/// Summary returned by every import operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub realm: String,
    pub status: ImportStatus,
    pub stages: Vec<StageReport>,
    pub unresolved: Vec<UnresolvedReference>,
}

impl ImportReport {
    pub fn new(realm: &str) -> Self {
        Self {
            realm: realm.to_string(),
            status: ImportStatus::Imported,
            stages: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    pub fn skipped_existing(realm: &str) -> Self {
        Self {
            status: ImportStatus::SkippedExisting,
            ..Self::new(realm)
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Names created by `stage`, empty if the stage did not run
    pub fn created(&self, stage: Stage) -> &[String] {
        self.stage(stage).map(|s| s.created.as_slice()).unwrap_or(&[])
    }

    /// True when nothing failed and every reference resolved. Skips are
    /// expected (policy filters, items already present).
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.stages.iter().all(StageReport::is_clean)
    }
}
