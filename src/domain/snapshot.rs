//! Realm snapshot and the backup document formats built from it

use super::records::{
    nullable, ClientRecord, ClientScopeRecord, EventsConfigRecord, GroupRecord,
    IdentityProviderRecord, RealmRecord, RoleRecord, UserRecord, UserWithRolesRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Archive format version written into `backupMetadata.version`
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Complete exportable state of one realm.
///
/// Every collection defaults to empty when its key is missing or `null`,
/// so a partial archive still imports whatever it does carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmSnapshot {
    #[serde(default)]
    pub realm: RealmRecord,
    #[serde(default, deserialize_with = "nullable")]
    pub clients: Vec<ClientRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub roles: Vec<RoleRecord>,
    /// Client-level roles keyed by external clientId
    #[serde(default, deserialize_with = "nullable")]
    pub client_roles: BTreeMap<String, Vec<RoleRecord>>,
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<UserRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub users_with_roles: Vec<UserWithRolesRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub groups: Vec<GroupRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub identity_providers: Vec<IdentityProviderRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub client_scopes: Vec<ClientScopeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_config: Option<EventsConfigRecord>,
    /// Authorization settings keyed by external clientId
    #[serde(default, deserialize_with = "nullable")]
    pub authorization_settings: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_metadata: Option<BackupMetadata>,
}

impl RealmSnapshot {
    /// Realm name carried by the snapshot, if any
    pub fn realm_name(&self) -> Option<&str> {
        self.realm.name()
    }

    /// Stamp the snapshot with export metadata
    pub fn stamp(&mut self, realm_name: &str, at: DateTime<Utc>) {
        self.backup_metadata = Some(BackupMetadata {
            timestamp: at.to_rfc3339(),
            realm_name: realm_name.to_string(),
            version: BACKUP_FORMAT_VERSION.to_string(),
            users_count: self.users.len(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub timestamp: String,
    pub realm_name: String,
    pub version: String,
    pub users_count: usize,
}

/// Users-with-roles extract: the `users-with-roles.json` ZIP entry and the
/// standalone users-with-roles export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersWithRolesBackup {
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<UserWithRolesRecord>,
    pub backup_metadata: UsersBackupMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersBackupMetadata {
    pub timestamp: String,
    pub realm_name: String,
    pub total_users: usize,
}

impl UsersWithRolesBackup {
    pub fn new(realm_name: &str, users: Vec<UserWithRolesRecord>, at: DateTime<Utc>) -> Self {
        Self {
            backup_metadata: UsersBackupMetadata {
                timestamp: at.to_rfc3339(),
                realm_name: realm_name.to_string(),
                total_users: users.len(),
            },
            users,
        }
    }

    pub fn from_snapshot(snapshot: &RealmSnapshot, realm_name: &str, at: DateTime<Utc>) -> Self {
        Self::new(realm_name, snapshot.users_with_roles.clone(), at)
    }
}
