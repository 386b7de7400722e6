//! Common test utilities: an in-memory directory service and the "acme"
//! fixture realm.

#![allow(dead_code)]

use async_trait::async_trait;
use realm_backup::config::BackupConfig;
use realm_backup::domain::{
    ClientRecord, ClientScopeRecord, EventsConfigRecord, GroupRecord, IdentityProviderRecord,
    RealmRecord, RoleRecord, UserRecord,
};
use realm_backup::error::{AppError, Result};
use realm_backup::keycloak::DirectoryService;
use realm_backup::policy::ClassificationPolicy;
use realm_backup::service::BackupService;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const ACME: &str = "acme";

#[derive(Default)]
struct RealmState {
    record: RealmRecord,
    clients: Vec<ClientRecord>,
    /// Realm and client roles; client roles carry the client id as container
    roles: Vec<RoleRecord>,
    composites: HashMap<String, Vec<String>>,
    groups: Vec<GroupRecord>,
    identity_providers: Vec<IdentityProviderRecord>,
    client_scopes: Vec<ClientScopeRecord>,
    events: EventsConfigRecord,
    users: Vec<UserRecord>,
    role_mappings: HashMap<String, Vec<String>>,
    memberships: HashMap<String, Vec<String>>,
    authorization: HashMap<String, Value>,
}

impl RealmState {
    fn role(&self, id: &str) -> Option<&RoleRecord> {
        self.roles.iter().find(|r| r.id.as_deref() == Some(id))
    }

    fn realm_role(&self, name: &str) -> Option<&RoleRecord> {
        self.roles
            .iter()
            .find(|r| r.client_role != Some(true) && r.name == name)
    }

    fn client_role(&self, client_uuid: &str, name: &str) -> Option<&RoleRecord> {
        self.roles.iter().find(|r| {
            r.client_role == Some(true)
                && r.container_id.as_deref() == Some(client_uuid)
                && r.name == name
        })
    }

    fn user_id(&self, username: &str) -> Option<String> {
        self.users
            .iter()
            .find(|u| u.username.as_deref() == Some(username))
            .and_then(|u| u.id.clone())
    }

    fn client_uuid(&self, client_id: &str) -> Option<String> {
        self.clients
            .iter()
            .find(|c| c.client_id.as_deref() == Some(client_id))
            .and_then(|c| c.id.clone())
    }

    fn client_id_of(&self, uuid: &str) -> Option<String> {
        self.clients
            .iter()
            .find(|c| c.id.as_deref() == Some(uuid))
            .and_then(|c| c.client_id.clone())
    }

    fn has_user(&self, user_id: &str) -> Result<()> {
        if self.users.iter().any(|u| u.id.as_deref() == Some(user_id)) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("user {}", user_id)))
        }
    }

    fn attach_roles(&mut self, user_id: &str, roles: &[RoleRecord]) -> Result<()> {
        self.has_user(user_id)?;
        for role in roles {
            let id = role
                .id
                .clone()
                .filter(|id| self.role(id).is_some())
                .ok_or_else(|| AppError::NotFound(format!("role {}", role.name)))?;
            let mapped = self.role_mappings.entry(user_id.to_string()).or_default();
            if !mapped.contains(&id) {
                mapped.push(id);
            }
        }
        Ok(())
    }

    fn attach_composites(&mut self, owner_id: &str, targets: &[RoleRecord]) -> Result<()> {
        for target in targets {
            let id = target
                .id
                .clone()
                .filter(|id| self.role(id).is_some())
                .ok_or_else(|| AppError::NotFound(format!("role {}", target.name)))?;
            let list = self.composites.entry(owner_id.to_string()).or_default();
            if !list.contains(&id) {
                list.push(id);
            }
        }
        if let Some(owner) = self
            .roles
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(owner_id))
        {
            owner.composite = Some(true);
        }
        Ok(())
    }
}

#[derive(Default)]
struct State {
    realms: BTreeMap<String, RealmState>,
    next_id: u64,
    failures: HashSet<(String, Option<String>)>,
    mutations: Vec<String>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn check(&self, op: &str, key: Option<&str>) -> Result<()> {
        let everywhere = self.failures.contains(&(op.to_string(), None));
        let keyed = key.is_some_and(|k| {
            self.failures
                .contains(&(op.to_string(), Some(k.to_string())))
        });
        if everywhere || keyed {
            return Err(AppError::Keycloak(format!(
                "Failed to {}: 500 Internal Server Error - injected",
                op
            )));
        }
        Ok(())
    }

    fn realm(&self, realm: &str) -> Result<&RealmState> {
        self.realms
            .get(realm)
            .ok_or_else(|| AppError::NotFound(format!("realm {}", realm)))
    }

    fn realm_mut(&mut self, realm: &str) -> Result<&mut RealmState> {
        self.realms
            .get_mut(realm)
            .ok_or_else(|| AppError::NotFound(format!("realm {}", realm)))
    }

    fn mutate(&mut self, op: &str, realm: &str) {
        self.mutations.push(format!("{} {}", op, realm));
    }
}

fn find_group<'a>(groups: &'a [GroupRecord], id: &str) -> Option<&'a GroupRecord> {
    for group in groups {
        if group.id.as_deref() == Some(id) {
            return Some(group);
        }
        if let Some(found) = find_group(&group.sub_groups, id) {
            return Some(found);
        }
    }
    None
}

fn find_group_mut<'a>(groups: &'a mut [GroupRecord], id: &str) -> Option<&'a mut GroupRecord> {
    for group in groups.iter_mut() {
        if group.id.as_deref() == Some(id) {
            return Some(group);
        }
        if let Some(found) = find_group_mut(&mut group.sub_groups, id) {
            return Some(found);
        }
    }
    None
}

fn collect_paths(groups: &[GroupRecord], out: &mut Vec<String>) {
    for group in groups {
        if let Some(path) = &group.path {
            out.push(path.clone());
        }
        collect_paths(&group.sub_groups, out);
    }
}

/// In-memory stand-in for a Keycloak server.
///
/// Conflicts, not-found responses and ids behave like the admin API. Any
/// operation can be made to fail with [`FakeDirectory::fail_on`].
#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<State>,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Make `op` fail, everywhere or only for the given key
    pub fn fail_on(&self, op: &str, key: Option<&str>) {
        self.lock()
            .failures
            .insert((op.to_string(), key.map(str::to_string)));
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().mutations.len()
    }

    pub fn has_realm(&self, realm: &str) -> bool {
        self.lock().realms.contains_key(realm)
    }

    pub fn realm_record(&self, realm: &str) -> RealmRecord {
        self.lock().realms[realm].record.clone()
    }

    pub fn client_uuid(&self, realm: &str, client_id: &str) -> Option<String> {
        self.lock().realms[realm].client_uuid(client_id)
    }

    pub fn client_ids(&self, realm: &str) -> Vec<String> {
        self.lock().realms[realm]
            .clients
            .iter()
            .filter_map(|c| c.client_id.clone())
            .collect()
    }

    pub fn realm_role_names(&self, realm: &str) -> Vec<String> {
        self.lock().realms[realm]
            .roles
            .iter()
            .filter(|r| r.client_role != Some(true))
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn client_role_names(&self, realm: &str, client_id: &str) -> Vec<String> {
        let state = self.lock();
        let realm = &state.realms[realm];
        let Some(uuid) = realm.client_uuid(client_id) else {
            return Vec::new();
        };
        realm
            .roles
            .iter()
            .filter(|r| r.container_id.as_deref() == Some(uuid.as_str()))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Composite targets of a realm role: realm roles by name, client roles
    /// as `clientId/role`
    pub fn composite_names(&self, realm: &str, role: &str) -> Vec<String> {
        let state = self.lock();
        let realm = &state.realms[realm];
        let Some(owner) = realm.realm_role(role).and_then(|r| r.id.clone()) else {
            return Vec::new();
        };
        realm.describe_roles(realm.composites.get(&owner))
    }

    pub fn usernames(&self, realm: &str) -> Vec<String> {
        self.lock().realms[realm]
            .users
            .iter()
            .filter_map(|u| u.username.clone())
            .collect()
    }

    /// Directly assigned roles of a user, in the same form as
    /// [`FakeDirectory::composite_names`]
    pub fn user_role_names(&self, realm: &str, username: &str) -> Vec<String> {
        let state = self.lock();
        let realm = &state.realms[realm];
        let Some(user_id) = realm.user_id(username) else {
            return Vec::new();
        };
        realm.describe_roles(realm.role_mappings.get(&user_id))
    }

    pub fn user_group_paths(&self, realm: &str, username: &str) -> Vec<String> {
        let state = self.lock();
        let realm = &state.realms[realm];
        let Some(user_id) = realm.user_id(username) else {
            return Vec::new();
        };
        realm
            .memberships
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| find_group(&realm.groups, id))
            .filter_map(|g| g.path.clone())
            .collect()
    }

    pub fn group_paths(&self, realm: &str) -> Vec<String> {
        let mut paths = Vec::new();
        collect_paths(&self.lock().realms[realm].groups, &mut paths);
        paths
    }

    pub fn identity_provider_aliases(&self, realm: &str) -> Vec<String> {
        self.lock().realms[realm]
            .identity_providers
            .iter()
            .map(|p| p.alias.clone())
            .collect()
    }

    pub fn client_scopes(&self, realm: &str) -> Vec<ClientScopeRecord> {
        self.lock().realms[realm].client_scopes.clone()
    }

    pub fn set_authorization_settings(&self, realm: &str, client_uuid: &str, settings: Value) {
        self.lock()
            .realms
            .get_mut(realm)
            .unwrap()
            .authorization
            .insert(client_uuid.to_string(), settings);
    }

    pub fn set_events_config(&self, realm: &str, config: EventsConfigRecord) {
        self.lock().realms.get_mut(realm).unwrap().events = config;
    }
}

impl RealmState {
    fn describe_roles(&self, ids: Option<&Vec<String>>) -> Vec<String> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.role(id))
            .map(|role| {
                if role.client_role == Some(true) {
                    let client = role
                        .container_id
                        .as_deref()
                        .and_then(|uuid| self.client_id_of(uuid))
                        .unwrap_or_default();
                    format!("{}/{}", client, role.name)
                } else {
                    role.name.clone()
                }
            })
            .collect()
    }
}

#[async_trait]
impl DirectoryService for FakeDirectory {
    async fn list_realms(&self) -> Result<Vec<RealmRecord>> {
        let state = self.lock();
        state.check("list_realms", None)?;
        Ok(state.realms.values().map(|r| r.record.clone()).collect())
    }

    async fn get_realm(&self, realm: &str) -> Result<RealmRecord> {
        let state = self.lock();
        state.check("get_realm", Some(realm))?;
        Ok(state.realm(realm)?.record.clone())
    }

    async fn realm_exists(&self, realm: &str) -> Result<bool> {
        let state = self.lock();
        state.check("realm_exists", Some(realm))?;
        Ok(state.realms.contains_key(realm))
    }

    async fn create_realm(&self, record: &RealmRecord) -> Result<()> {
        let mut state = self.lock();
        let name = record.name().unwrap_or_default().to_string();
        state.mutate("create_realm", &name);
        state.check("create_realm", Some(&name))?;
        if state.realms.contains_key(&name) {
            return Err(AppError::Conflict(format!("realm {}", name)));
        }
        let mut stored = record.clone();
        stored.id = Some(state.next_id("realm"));
        let container = stored.id.clone();
        let mut realm = RealmState {
            record: stored,
            ..Default::default()
        };

        // Keycloak adds these to every new realm
        for role in builtin_role_names(&name) {
            let id = state.next_id("role");
            realm.roles.push(RoleRecord {
                id: Some(id),
                composite: Some(false),
                client_role: Some(false),
                container_id: container.clone(),
                ..RoleRecord::new(&role)
            });
        }
        let system = realm.roles[1..].to_vec();
        if let Some(owner) = realm.roles[0].id.clone() {
            realm.attach_composites(&owner, &system)?;
        }

        state.realms.insert(name, realm);
        Ok(())
    }

    async fn list_clients(&self, realm: &str) -> Result<Vec<ClientRecord>> {
        let state = self.lock();
        state.check("list_clients", Some(realm))?;
        Ok(state.realm(realm)?.clients.clone())
    }

    async fn find_clients_by_client_id(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<Vec<ClientRecord>> {
        let state = self.lock();
        state.check("find_clients_by_client_id", Some(client_id))?;
        Ok(state
            .realm(realm)?
            .clients
            .iter()
            .filter(|c| c.client_id.as_deref() == Some(client_id))
            .cloned()
            .collect())
    }

    async fn create_client(&self, realm: &str, client: &ClientRecord) -> Result<String> {
        let mut state = self.lock();
        state.mutate("create_client", realm);
        state.check("create_client", client.client_id.as_deref())?;
        if state.realm(realm)?.client_uuid(client.label()).is_some() {
            return Err(AppError::Conflict(format!("client {}", client.label())));
        }
        let id = state.next_id("client");
        let mut stored = client.clone();
        stored.id = Some(id.clone());
        state.realm_mut(realm)?.clients.push(stored);
        Ok(id)
    }

    async fn get_authorization_settings(&self, realm: &str, client_uuid: &str) -> Result<Value> {
        let state = self.lock();
        state.check("get_authorization_settings", Some(client_uuid))?;
        state
            .realm(realm)?
            .authorization
            .get(client_uuid)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("authorization for {}", client_uuid)))
    }

    async fn list_realm_roles(&self, realm: &str) -> Result<Vec<RoleRecord>> {
        let state = self.lock();
        state.check("list_realm_roles", Some(realm))?;
        Ok(state
            .realm(realm)?
            .roles
            .iter()
            .filter(|r| r.client_role != Some(true))
            .cloned()
            .collect())
    }

    async fn get_realm_role(&self, realm: &str, name: &str) -> Result<RoleRecord> {
        let state = self.lock();
        state.check("get_realm_role", Some(name))?;
        state
            .realm(realm)?
            .realm_role(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("role {}", name)))
    }

    async fn create_realm_role(&self, realm: &str, role: &RoleRecord) -> Result<()> {
        let mut state = self.lock();
        state.mutate("create_realm_role", realm);
        state.check("create_realm_role", Some(&role.name))?;
        let container = state.realm(realm)?.record.id.clone();
        if state.realm(realm)?.realm_role(&role.name).is_some() {
            return Err(AppError::Conflict(format!("role {}", role.name)));
        }
        let id = state.next_id("role");
        state.realm_mut(realm)?.roles.push(RoleRecord {
            id: Some(id),
            composite: Some(false),
            client_role: Some(false),
            container_id: container,
            composites: None,
            ..role.clone()
        });
        Ok(())
    }

    async fn list_role_composites(&self, realm: &str, role_id: &str) -> Result<Vec<RoleRecord>> {
        let state = self.lock();
        state.check("list_role_composites", Some(role_id))?;
        let realm = state.realm(realm)?;
        if realm.role(role_id).is_none() {
            return Err(AppError::NotFound(format!("role {}", role_id)));
        }
        Ok(realm
            .composites
            .get(role_id)
            .into_iter()
            .flatten()
            .filter_map(|id| realm.role(id).cloned())
            .collect())
    }

    async fn add_realm_role_composites(
        &self,
        realm: &str,
        role_name: &str,
        composites: &[RoleRecord],
    ) -> Result<()> {
        let mut state = self.lock();
        state.mutate("add_realm_role_composites", realm);
        state.check("add_realm_role_composites", Some(role_name))?;
        let realm = state.realm_mut(realm)?;
        let owner = realm
            .realm_role(role_name)
            .and_then(|r| r.id.clone())
            .ok_or_else(|| AppError::NotFound(format!("role {}", role_name)))?;
        realm.attach_composites(&owner, composites)
    }

    async fn list_client_roles(&self, realm: &str, client_uuid: &str) -> Result<Vec<RoleRecord>> {
        let state = self.lock();
        state.check("list_client_roles", Some(client_uuid))?;
        let realm = state.realm(realm)?;
        if realm.client_id_of(client_uuid).is_none() {
            return Err(AppError::NotFound(format!("client {}", client_uuid)));
        }
        Ok(realm
            .roles
            .iter()
            .filter(|r| r.client_role == Some(true))
            .filter(|r| r.container_id.as_deref() == Some(client_uuid))
            .cloned()
            .collect())
    }

    async fn get_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<RoleRecord> {
        let state = self.lock();
        state.check("get_client_role", Some(name))?;
        state
            .realm(realm)?
            .client_role(client_uuid, name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("client role {}", name)))
    }

    async fn create_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        role: &RoleRecord,
    ) -> Result<()> {
        let mut state = self.lock();
        state.mutate("create_client_role", realm);
        state.check("create_client_role", Some(&role.name))?;
        {
            let existing = state.realm(realm)?;
            if existing.client_id_of(client_uuid).is_none() {
                return Err(AppError::NotFound(format!("client {}", client_uuid)));
            }
            if existing.client_role(client_uuid, &role.name).is_some() {
                return Err(AppError::Conflict(format!("client role {}", role.name)));
            }
        }
        let id = state.next_id("role");
        state.realm_mut(realm)?.roles.push(RoleRecord {
            id: Some(id),
            composite: Some(false),
            client_role: Some(true),
            container_id: Some(client_uuid.to_string()),
            composites: None,
            ..role.clone()
        });
        Ok(())
    }

    async fn add_client_role_composites(
        &self,
        realm: &str,
        client_uuid: &str,
        role_name: &str,
        composites: &[RoleRecord],
    ) -> Result<()> {
        let mut state = self.lock();
        state.mutate("add_client_role_composites", realm);
        state.check("add_client_role_composites", Some(role_name))?;
        let realm = state.realm_mut(realm)?;
        let owner = realm
            .client_role(client_uuid, role_name)
            .and_then(|r| r.id.clone())
            .ok_or_else(|| AppError::NotFound(format!("client role {}", role_name)))?;
        realm.attach_composites(&owner, composites)
    }

    async fn list_groups(&self, realm: &str) -> Result<Vec<GroupRecord>> {
        let state = self.lock();
        state.check("list_groups", Some(realm))?;
        Ok(state.realm(realm)?.groups.clone())
    }

    async fn create_group(&self, realm: &str, group: &GroupRecord) -> Result<String> {
        let mut state = self.lock();
        state.mutate("create_group", realm);
        state.check("create_group", Some(&group.name))?;
        if state.realm(realm)?.groups.iter().any(|g| g.name == group.name) {
            return Err(AppError::Conflict(format!("group {}", group.name)));
        }
        let id = state.next_id("group");
        state.realm_mut(realm)?.groups.push(GroupRecord {
            id: Some(id.clone()),
            path: Some(format!("/{}", group.name)),
            sub_groups: Vec::new(),
            ..group.clone()
        });
        Ok(id)
    }

    async fn create_child_group(
        &self,
        realm: &str,
        parent_id: &str,
        group: &GroupRecord,
    ) -> Result<String> {
        let mut state = self.lock();
        state.mutate("create_child_group", realm);
        state.check("create_child_group", Some(&group.name))?;
        let id = state.next_id("group");
        let realm = state.realm_mut(realm)?;
        let parent = find_group_mut(&mut realm.groups, parent_id)
            .ok_or_else(|| AppError::NotFound(format!("group {}", parent_id)))?;
        if parent.sub_groups.iter().any(|g| g.name == group.name) {
            return Err(AppError::Conflict(format!("group {}", group.name)));
        }
        let path = format!("{}/{}", parent.path.clone().unwrap_or_default(), group.name);
        parent.sub_groups.push(GroupRecord {
            id: Some(id.clone()),
            path: Some(path),
            sub_groups: Vec::new(),
            ..group.clone()
        });
        Ok(id)
    }

    async fn list_identity_providers(&self, realm: &str) -> Result<Vec<IdentityProviderRecord>> {
        let state = self.lock();
        state.check("list_identity_providers", Some(realm))?;
        Ok(state.realm(realm)?.identity_providers.clone())
    }

    async fn create_identity_provider(
        &self,
        realm: &str,
        provider: &IdentityProviderRecord,
    ) -> Result<()> {
        let mut state = self.lock();
        state.mutate("create_identity_provider", realm);
        state.check("create_identity_provider", Some(&provider.alias))?;
        if state
            .realm(realm)?
            .identity_providers
            .iter()
            .any(|p| p.alias == provider.alias)
        {
            return Err(AppError::Conflict(format!("provider {}", provider.alias)));
        }
        let id = state.next_id("idp");
        state
            .realm_mut(realm)?
            .identity_providers
            .push(IdentityProviderRecord {
                internal_id: Some(id),
                ..provider.clone()
            });
        Ok(())
    }

    async fn list_client_scopes(&self, realm: &str) -> Result<Vec<ClientScopeRecord>> {
        let state = self.lock();
        state.check("list_client_scopes", Some(realm))?;
        Ok(state.realm(realm)?.client_scopes.clone())
    }

    async fn create_client_scope(&self, realm: &str, scope: &ClientScopeRecord) -> Result<()> {
        let mut state = self.lock();
        state.mutate("create_client_scope", realm);
        state.check("create_client_scope", Some(&scope.name))?;
        if state
            .realm(realm)?
            .client_scopes
            .iter()
            .any(|s| s.name == scope.name)
        {
            return Err(AppError::Conflict(format!("client scope {}", scope.name)));
        }
        let id = state.next_id("scope");
        state.realm_mut(realm)?.client_scopes.push(ClientScopeRecord {
            id: Some(id),
            ..scope.clone()
        });
        Ok(())
    }

    async fn get_events_config(&self, realm: &str) -> Result<EventsConfigRecord> {
        let state = self.lock();
        state.check("get_events_config", Some(realm))?;
        Ok(state.realm(realm)?.events.clone())
    }

    async fn list_users(&self, realm: &str, first: u32, max: u32) -> Result<Vec<UserRecord>> {
        let state = self.lock();
        state.check("list_users", Some(realm))?;
        Ok(state
            .realm(realm)?
            .users
            .iter()
            .skip(first as usize)
            .take(max as usize)
            .cloned()
            .collect())
    }

    async fn create_user(&self, realm: &str, user: &UserRecord) -> Result<String> {
        let mut state = self.lock();
        state.mutate("create_user", realm);
        state.check("create_user", user.username.as_deref())?;
        let exists = state.realm(realm)?.users.iter().any(|u| {
            u.username
                .as_deref()
                .zip(user.username.as_deref())
                .is_some_and(|(a, b)| a.eq_ignore_ascii_case(b))
        });
        if exists {
            return Err(AppError::Conflict(format!("user {}", user.label())));
        }
        let id = state.next_id("user");
        state.realm_mut(realm)?.users.push(UserRecord {
            id: Some(id.clone()),
            ..user.clone()
        });
        Ok(id)
    }

    async fn search_users_by_username(
        &self,
        realm: &str,
        username: &str,
    ) -> Result<Vec<UserRecord>> {
        let state = self.lock();
        state.check("search_users_by_username", Some(username))?;
        Ok(state
            .realm(realm)?
            .users
            .iter()
            .filter(|u| {
                u.username
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(username))
            })
            .cloned()
            .collect())
    }

    async fn list_user_realm_roles(&self, realm: &str, user_id: &str) -> Result<Vec<RoleRecord>> {
        let state = self.lock();
        state.check("list_user_realm_roles", Some(user_id))?;
        let realm = state.realm(realm)?;
        realm.has_user(user_id)?;
        Ok(realm
            .role_mappings
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| realm.role(id))
            .filter(|r| r.client_role != Some(true))
            .cloned()
            .collect())
    }

    async fn list_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client_uuid: &str,
    ) -> Result<Vec<RoleRecord>> {
        let state = self.lock();
        state.check("list_user_client_roles", Some(client_uuid))?;
        let realm = state.realm(realm)?;
        realm.has_user(user_id)?;
        Ok(realm
            .role_mappings
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| realm.role(id))
            .filter(|r| r.container_id.as_deref() == Some(client_uuid))
            .cloned()
            .collect())
    }

    async fn list_user_groups(&self, realm: &str, user_id: &str) -> Result<Vec<GroupRecord>> {
        let state = self.lock();
        state.check("list_user_groups", Some(user_id))?;
        let realm = state.realm(realm)?;
        realm.has_user(user_id)?;
        Ok(realm
            .memberships
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| find_group(&realm.groups, id))
            .map(|g| GroupRecord {
                sub_groups: Vec::new(),
                ..g.clone()
            })
            .collect())
    }

    async fn add_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRecord],
    ) -> Result<()> {
        let mut state = self.lock();
        state.mutate("add_user_realm_roles", realm);
        state.check("add_user_realm_roles", Some(user_id))?;
        state.realm_mut(realm)?.attach_roles(user_id, roles)
    }

    async fn add_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client_uuid: &str,
        roles: &[RoleRecord],
    ) -> Result<()> {
        let mut state = self.lock();
        state.mutate("add_user_client_roles", realm);
        state.check("add_user_client_roles", Some(client_uuid))?;
        state.realm_mut(realm)?.attach_roles(user_id, roles)
    }

    async fn add_user_to_group(&self, realm: &str, user_id: &str, group_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.mutate("add_user_to_group", realm);
        state.check("add_user_to_group", Some(group_id))?;
        let realm = state.realm_mut(realm)?;
        realm.has_user(user_id)?;
        if find_group(&realm.groups, group_id).is_none() {
            return Err(AppError::NotFound(format!("group {}", group_id)));
        }
        let groups = realm.memberships.entry(user_id.to_string()).or_default();
        if !groups.contains(&group_id.to_string()) {
            groups.push(group_id.to_string());
        }
        Ok(())
    }
}

/// Realm roles a new realm starts with, composite default role first
pub fn builtin_role_names(realm: &str) -> Vec<String> {
    vec![
        format!("default-roles-{}", realm),
        "offline_access".to_string(),
        "uma_authorization".to_string(),
    ]
}

/// Realm role names minus the ones every realm starts with
pub fn custom_realm_role_names(dir: &FakeDirectory, realm: &str) -> Vec<String> {
    let builtin = builtin_role_names(realm);
    dir.realm_role_names(realm)
        .into_iter()
        .filter(|name| !builtin.contains(name))
        .collect()
}

/// Seed the "acme" realm:
///
/// - clients app1 (authorization enabled), app2 and the built-in admin-cli
/// - realm roles viewer and editor (composite of viewer and app1/reader),
///   next to the built-in default-roles-acme, offline_access and
///   uma_authorization
/// - client roles app1/reader, app1/writer (composite of viewer) and
///   app2/deployer
/// - groups /eng, /eng/platform and /ops
/// - users alice (editor, app1/writer, app2/deployer, /eng/platform), bob
///   (nothing) and carol (default-roles-acme, viewer, /ops)
pub async fn seed_acme(dir: &FakeDirectory) {
    let mut realm = RealmRecord::named(ACME);
    realm.display_name = Some("Acme Corp".to_string());
    realm
        .extra
        .insert("sslRequired".to_string(), json!("external"));
    dir.create_realm(&realm).await.unwrap();

    let app1 = dir
        .create_client(
            ACME,
            &ClientRecord {
                authorization_services_enabled: Some(true),
                ..ClientRecord::new("app1")
            },
        )
        .await
        .unwrap();
    let app2 = dir
        .create_client(ACME, &ClientRecord::new("app2"))
        .await
        .unwrap();
    dir.create_client(ACME, &ClientRecord::new("admin-cli"))
        .await
        .unwrap();
    dir.set_authorization_settings(ACME, &app1, json!({"policyEnforcementMode": "ENFORCING"}));

    for name in ["viewer", "editor"] {
        dir.create_realm_role(ACME, &RoleRecord::new(name))
            .await
            .unwrap();
    }
    for name in ["reader", "writer"] {
        dir.create_client_role(ACME, &app1, &RoleRecord::new(name))
            .await
            .unwrap();
    }
    dir.create_client_role(ACME, &app2, &RoleRecord::new("deployer"))
        .await
        .unwrap();

    let viewer = dir.get_realm_role(ACME, "viewer").await.unwrap();
    let editor = dir.get_realm_role(ACME, "editor").await.unwrap();
    let default_roles = dir.get_realm_role(ACME, "default-roles-acme").await.unwrap();
    let reader = dir.get_client_role(ACME, &app1, "reader").await.unwrap();
    let writer = dir.get_client_role(ACME, &app1, "writer").await.unwrap();
    let deployer = dir.get_client_role(ACME, &app2, "deployer").await.unwrap();
    dir.add_realm_role_composites(ACME, "editor", &[viewer.clone(), reader])
        .await
        .unwrap();
    dir.add_client_role_composites(ACME, &app1, "writer", &[viewer.clone()])
        .await
        .unwrap();

    let eng = dir
        .create_group(ACME, &GroupRecord::new("eng"))
        .await
        .unwrap();
    let platform = dir
        .create_child_group(ACME, &eng, &GroupRecord::new("platform"))
        .await
        .unwrap();
    let ops = dir
        .create_group(ACME, &GroupRecord::new("ops"))
        .await
        .unwrap();

    dir.create_identity_provider(
        ACME,
        &IdentityProviderRecord {
            alias: "google".to_string(),
            provider_id: Some("google".to_string()),
            enabled: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let mut scope = ClientScopeRecord {
        name: "department".to_string(),
        protocol: Some("openid-connect".to_string()),
        ..Default::default()
    };
    scope.extra.insert(
        "protocolMappers".to_string(),
        json!([{"id": "pm-1", "name": "department", "protocol": "openid-connect"}]),
    );
    dir.create_client_scope(ACME, &scope).await.unwrap();

    dir.set_events_config(
        ACME,
        EventsConfigRecord {
            events_enabled: Some(true),
            events_listeners: vec!["jboss-logging".to_string()],
            ..Default::default()
        },
    );

    let mut alice = UserRecord::new("alice");
    alice.email = Some("alice@acme.test".to_string());
    let alice = dir.create_user(ACME, &alice).await.unwrap();
    dir.create_user(ACME, &UserRecord::new("bob")).await.unwrap();
    let carol = dir.create_user(ACME, &UserRecord::new("carol")).await.unwrap();

    dir.add_user_realm_roles(ACME, &alice, &[editor]).await.unwrap();
    dir.add_user_client_roles(ACME, &alice, &app1, &[writer])
        .await
        .unwrap();
    dir.add_user_client_roles(ACME, &alice, &app2, &[deployer])
        .await
        .unwrap();
    dir.add_user_to_group(ACME, &alice, &platform).await.unwrap();

    dir.add_user_realm_roles(ACME, &carol, &[default_roles, viewer])
        .await
        .unwrap();
    dir.add_user_to_group(ACME, &carol, &ops).await.unwrap();
}

/// Fake directory with the "acme" realm already seeded
pub async fn acme_directory() -> Arc<FakeDirectory> {
    let dir = FakeDirectory::new();
    seed_acme(&dir).await;
    dir
}

pub fn backup_service(dir: &Arc<FakeDirectory>, backup_dir: &Path) -> BackupService {
    let config = BackupConfig {
        backup_dir: backup_dir.to_path_buf(),
        users_page_size: 2,
    };
    BackupService::new(
        dir.clone(),
        Arc::new(ClassificationPolicy::default()),
        &config,
    )
}
