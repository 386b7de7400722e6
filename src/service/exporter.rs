//! Realm export: walks a realm through the directory service and assembles
//! a [`RealmSnapshot`].
//!
//! Only the base realm read is fatal. Every secondary collection is fetched
//! once and degrades to empty on failure, and user enrichment is isolated
//! per user and per client.

use crate::domain::{
    ClientRecord, ElementExport, ElementKind, RealmSnapshot, RoleComposites, RoleRecord, RoleRef,
    UserRecord, UserWithRolesRecord,
};
use crate::error::{AppError, Result};
use crate::keycloak::DirectoryService;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument, warn};

pub struct ConfigurationExporter {
    users_page_size: u32,
}

impl ConfigurationExporter {
    pub fn new(users_page_size: u32) -> Self {
        Self {
            users_page_size: users_page_size.max(1),
        }
    }

    /// Export one realm
    #[instrument(skip(self, directory))]
    pub async fn export_realm(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
    ) -> Result<RealmSnapshot> {
        let realm_record = directory
            .get_realm(realm)
            .await
            .map_err(|e| AppError::DirectoryUnavailable(format!("{}: {}", realm, e)))?;

        let clients = or_empty("clients", self.clients(directory, realm).await);
        let roles = or_empty("roles", self.realm_roles(directory, realm, &clients).await);
        let client_roles = self.client_roles(directory, realm, &clients).await;
        let users = or_empty("users", self.users(directory, realm).await);
        let users_with_roles = self
            .enrich_users(directory, realm, &users, &clients)
            .await;
        let groups = or_empty("groups", directory.list_groups(realm).await);
        let identity_providers = or_empty(
            "identity providers",
            directory.list_identity_providers(realm).await,
        );
        let client_scopes = or_empty("client scopes", directory.list_client_scopes(realm).await);
        let events_config = match directory.get_events_config(realm).await {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(error = %e, "Failed to fetch events config");
                None
            }
        };
        let authorization_settings = self
            .authorization_settings(directory, realm, &clients)
            .await;

        let mut snapshot = RealmSnapshot {
            realm: realm_record,
            clients,
            roles,
            client_roles,
            users,
            users_with_roles,
            groups,
            identity_providers,
            client_scopes,
            events_config,
            authorization_settings,
            backup_metadata: None,
        };
        snapshot.stamp(realm, Utc::now());

        info!(
            clients = snapshot.clients.len(),
            roles = snapshot.roles.len(),
            users = snapshot.users.len(),
            groups = snapshot.groups.len(),
            "Realm exported"
        );
        Ok(snapshot)
    }

    /// Export every realm the directory service knows, keyed by realm name
    #[instrument(skip(self, directory))]
    pub async fn export_all(
        &self,
        directory: &dyn DirectoryService,
    ) -> Result<BTreeMap<String, RealmSnapshot>> {
        let realms = directory
            .list_realms()
            .await
            .map_err(|e| AppError::DirectoryUnavailable(format!("list realms: {}", e)))?;

        let mut snapshots = BTreeMap::new();
        for realm in realms {
            let Some(name) = realm.name().map(str::to_string) else {
                warn!("Skipping realm without a name");
                continue;
            };
            let snapshot = self.export_realm(directory, &name).await?;
            snapshots.insert(name, snapshot);
        }
        Ok(snapshots)
    }

    /// Export a single collection. Fetch failures propagate.
    #[instrument(skip(self, directory))]
    pub async fn export_element(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
        kind: ElementKind,
    ) -> Result<ElementExport> {
        let export = match kind {
            ElementKind::Clients => ElementExport::Clients(self.clients(directory, realm).await?),
            ElementKind::Users => ElementExport::Users(self.users(directory, realm).await?),
            ElementKind::Roles => {
                let clients = self.clients(directory, realm).await?;
                ElementExport::Roles(self.realm_roles(directory, realm, &clients).await?)
            }
            ElementKind::Groups => ElementExport::Groups(directory.list_groups(realm).await?),
            ElementKind::IdentityProviders => {
                ElementExport::IdentityProviders(directory.list_identity_providers(realm).await?)
            }
            ElementKind::ClientScopes => {
                ElementExport::ClientScopes(directory.list_client_scopes(realm).await?)
            }
            ElementKind::UsersWithRoles => {
                ElementExport::UsersWithRoles(self.users_with_roles(directory, realm).await?)
            }
        };

        info!(count = export.len(), "Element exported");
        Ok(export)
    }

    /// Users with their role bindings and group memberships
    #[instrument(skip(self, directory))]
    pub async fn users_with_roles(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
    ) -> Result<Vec<UserWithRolesRecord>> {
        let clients = self.clients(directory, realm).await?;
        let users = self.users(directory, realm).await?;
        Ok(self.enrich_users(directory, realm, &users, &clients).await)
    }

    async fn clients(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
    ) -> Result<Vec<ClientRecord>> {
        directory.list_clients(realm).await
    }

    /// All users, page by page until a short page
    async fn users(&self, directory: &dyn DirectoryService, realm: &str) -> Result<Vec<UserRecord>> {
        let mut users = Vec::new();
        let mut first = 0;
        loop {
            let page = directory
                .list_users(realm, first, self.users_page_size)
                .await?;
            let fetched = page.len();
            users.extend(page);
            if fetched < self.users_page_size as usize {
                break;
            }
            first += self.users_page_size;
        }
        Ok(users)
    }

    async fn realm_roles(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
        clients: &[ClientRecord],
    ) -> Result<Vec<RoleRecord>> {
        let roles = directory.list_realm_roles(realm).await?;
        let client_ids = client_id_map(clients);
        Ok(self
            .with_composites(directory, realm, roles, &client_ids)
            .await)
    }

    /// Client-level roles keyed by clientId; clients without roles are omitted
    async fn client_roles(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
        clients: &[ClientRecord],
    ) -> BTreeMap<String, Vec<RoleRecord>> {
        let client_ids = client_id_map(clients);
        let mut result = BTreeMap::new();

        for client in clients {
            let (Some(uuid), Some(client_id)) = (client.id.as_deref(), client.client_id.as_deref())
            else {
                continue;
            };
            match directory.list_client_roles(realm, uuid).await {
                Ok(roles) if !roles.is_empty() => {
                    let roles = self
                        .with_composites(directory, realm, roles, &client_ids)
                        .await;
                    result.insert(client_id.to_string(), roles);
                }
                Ok(_) => {}
                Err(e) => warn!(client_id = %client_id, error = %e, "Failed to fetch client roles"),
            }
        }
        result
    }

    /// Fill `composites` for every composite role
    async fn with_composites(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
        mut roles: Vec<RoleRecord>,
        client_ids: &HashMap<String, String>,
    ) -> Vec<RoleRecord> {
        for role in roles.iter_mut() {
            if role.composite != Some(true) {
                continue;
            }
            let Some(id) = role.id.as_deref() else {
                continue;
            };
            match directory.list_role_composites(realm, id).await {
                Ok(targets) => role.composites = Some(to_composites(targets, client_ids)),
                Err(e) => warn!(role = %role.name, error = %e, "Failed to fetch role composites"),
            }
        }
        roles
    }

    async fn enrich_users(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
        users: &[UserRecord],
        clients: &[ClientRecord],
    ) -> Vec<UserWithRolesRecord> {
        let mut result = Vec::with_capacity(users.len());
        for user in users {
            let mut record = UserWithRolesRecord::from_user(user);
            match user.id.as_deref() {
                Some(user_id) => {
                    if let Err(e) = self
                        .fill_bindings(directory, realm, user_id, clients, &mut record)
                        .await
                    {
                        warn!(user = %user.label(), error = %e, "Could not fetch user bindings");
                        record.realm_roles.clear();
                        record.client_roles.clear();
                        record.groups.clear();
                    }
                }
                None => warn!(user = %user.label(), "User has no id, bindings not exported"),
            }
            result.push(record);
        }
        result
    }

    /// A failing client only drops that client's entry
    async fn fill_bindings(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
        user_id: &str,
        clients: &[ClientRecord],
        record: &mut UserWithRolesRecord,
    ) -> Result<()> {
        record.realm_roles = directory
            .list_user_realm_roles(realm, user_id)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();

        for client in clients {
            let (Some(uuid), Some(client_id)) = (client.id.as_deref(), client.client_id.as_deref())
            else {
                continue;
            };
            match directory.list_user_client_roles(realm, user_id, uuid).await {
                Ok(roles) if !roles.is_empty() => {
                    record.client_roles.insert(
                        client_id.to_string(),
                        roles.into_iter().map(|r| r.name).collect(),
                    );
                }
                Ok(_) => {}
                Err(e) => debug!(client_id = %client_id, error = %e, "Skipping client roles for user"),
            }
        }

        record.groups = directory
            .list_user_groups(realm, user_id)
            .await?
            .into_iter()
            .map(|g| g.name)
            .collect();
        Ok(())
    }

    async fn authorization_settings(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
        clients: &[ClientRecord],
    ) -> BTreeMap<String, serde_json::Value> {
        let mut settings = BTreeMap::new();
        for client in clients
            .iter()
            .filter(|c| c.authorization_services_enabled == Some(true))
        {
            let (Some(uuid), Some(client_id)) = (client.id.as_deref(), client.client_id.as_deref())
            else {
                continue;
            };
            match directory.get_authorization_settings(realm, uuid).await {
                Ok(value) => {
                    settings.insert(client_id.to_string(), value);
                }
                Err(e) => debug!(client_id = %client_id, error = %e, "No authorization settings"),
            }
        }
        settings
    }
}

fn or_empty<T>(what: &str, result: Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(collection = what, error = %e, "Export fetch failed, continuing without it");
        Vec::new()
    })
}

/// Backend id → clientId
fn client_id_map(clients: &[ClientRecord]) -> HashMap<String, String> {
    clients
        .iter()
        .filter_map(|c| Some((c.id.clone()?, c.client_id.clone()?)))
        .collect()
}

fn to_composites(targets: Vec<RoleRecord>, client_ids: &HashMap<String, String>) -> RoleComposites {
    let mut composites = RoleComposites::default();
    for target in targets {
        if target.client_role == Some(true) {
            let client_id = target
                .container_id
                .as_ref()
                .and_then(|container| client_ids.get(container));
            match client_id {
                Some(client_id) => composites
                    .client
                    .entry(client_id.clone())
                    .or_default()
                    .push(RoleRef(target.name)),
                None => warn!(role = %target.name, "Composite client role has unknown container"),
            }
        } else {
            composites.realm.push(RoleRef(target.name));
        }
    }
    composites
}
