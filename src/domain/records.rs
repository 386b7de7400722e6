//! Entity records exchanged with the directory service and stored in archives
//!
//! Each record names the fields the backup pipeline reads or rewrites and
//! carries every other representation field through `extra` untouched, so
//! an exported realm re-imports with its full configuration.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Decode `null` as the type's default (empty list/map).
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Realm representation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RealmRecord {
    pub fn named(name: &str) -> Self {
        Self {
            realm: Some(name.to_string()),
            enabled: Some(true),
            ..Default::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.realm.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Client representation. `id` is the backend id, `client_id` the stable
/// external identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_services_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientRecord {
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            enabled: Some(true),
            ..Default::default()
        }
    }

    /// External clientId, or a placeholder for logging
    pub fn label(&self) -> &str {
        self.client_id.as_deref().unwrap_or("<unnamed client>")
    }
}

/// Reference to a role by name.
///
/// Decodes from either a bare name or a role object carrying `name`;
/// always encodes as the bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoleRef(pub String);

impl<'de> Deserialize<'de> for RoleRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Role { name: String },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(name) | Repr::Role { name } => RoleRef(name),
        })
    }
}

impl From<&str> for RoleRef {
    fn from(name: &str) -> Self {
        RoleRef(name.to_string())
    }
}

/// Composite targets of a role: realm roles by name, client roles grouped
/// by external clientId.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleComposites {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub realm: Vec<RoleRef>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub client: BTreeMap<String, Vec<RoleRef>>,
}

impl RoleComposites {
    pub fn is_empty(&self) -> bool {
        self.realm.is_empty() && self.client.values().all(Vec::is_empty)
    }
}

/// Role representation (realm-level or client-level)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_role: Option<bool>,
    /// Realm id for realm roles, client backend id for client roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composites: Option<RoleComposites>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoleRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Composites declared by this role, if any are non-empty
    pub fn declared_composites(&self) -> Option<&RoleComposites> {
        self.composites.as_ref().filter(|c| !c.is_empty())
    }
}

/// Bare user representation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    pub fn new(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            enabled: Some(true),
            ..Default::default()
        }
    }

    pub fn label(&self) -> &str {
        self.username.as_deref().unwrap_or("<unnamed user>")
    }
}

/// User identity plus its direct role bindings and group memberships
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithRolesRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub attributes: Option<Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub realm_roles: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub client_roles: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub groups: Vec<String>,
}

impl UserWithRolesRecord {
    /// Identity fields of `user` with no bindings
    pub fn from_user(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            enabled: user.enabled,
            email_verified: user.email_verified,
            created_timestamp: user.created_timestamp,
            attributes: user.extra.get("attributes").cloned(),
            ..Default::default()
        }
    }
}

/// Group representation, possibly with nested sub-groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub sub_groups: Vec<GroupRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroupRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Identity provider representation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderRecord {
    #[serde(default)]
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client scope representation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientScopeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Realm events configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsConfigRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_events_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events_listeners: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_event_types: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
