//! Realm import pipeline
//!
//! Replays a [`RealmSnapshot`] into the directory service in dependency
//! order:
//!
//! 1. resolve the target realm name
//! 2. existence check (strict or skip-existing)
//! 3. base realm creation
//! 4. client scopes
//! 5. clients (sensitive clients filtered)
//! 6. roles, flat first, then composites
//! 7. identity providers
//! 8. groups, parents before children
//! 9. users
//! 10. role bindings and group memberships
//!
//! Only archive problems, the reserved-realm guard, the existence check and
//! base realm creation abort the import. Every later stage is best-effort per
//! item and its outcome lands in the returned [`ImportReport`]. Nothing is
//! rolled back.

use super::composites::{ClientIndex, CompositeOwner, RoleCompositeResolver};
use super::report::{ImportReport, ReferenceKind, Stage, StageReport, UnresolvedReference};
use super::sanitizer;
use crate::domain::{GroupRecord, RealmRecord, RealmSnapshot, RoleRecord, UserWithRolesRecord};
use crate::error::{AppError, Result};
use crate::keycloak::DirectoryService;
use crate::policy::ClassificationPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Platform realm that must never be the target of an import
pub const RESERVED_REALM: &str = "master";

/// Which stages run and how strictly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub users: bool,
    pub clients: bool,
    pub roles: bool,
    pub groups: bool,
    pub client_scopes: bool,
    pub identity_providers: bool,
    pub role_bindings: bool,
    pub group_memberships: bool,
    /// Skip every default/system realm role during flat role creation.
    /// Roles the directory creates with the realm are skipped regardless.
    pub filter_default_roles: bool,
    /// Succeed without changes when the realm already exists
    pub skip_existing: bool,
    /// Drop nested entity collections from the realm representation
    pub strip_realm_entities: bool,
}

impl ImportOptions {
    /// Every stage, strict existence check
    pub fn full() -> Self {
        Self {
            users: true,
            clients: true,
            roles: true,
            groups: true,
            client_scopes: true,
            identity_providers: true,
            role_bindings: true,
            group_memberships: true,
            filter_default_roles: false,
            skip_existing: false,
            strip_realm_entities: false,
        }
    }

    /// Selected entity stages only. Role bindings are replayed when users
    /// are imported together with roles or clients, group memberships when
    /// users are imported together with groups.
    pub fn selective(
        users: bool,
        clients: bool,
        roles: bool,
        groups: bool,
        skip_existing: bool,
    ) -> Self {
        Self {
            users,
            clients,
            roles,
            groups,
            client_scopes: false,
            identity_providers: false,
            role_bindings: users && (roles || clients),
            group_memberships: users && groups,
            filter_default_roles: true,
            skip_existing,
            strip_realm_entities: false,
        }
    }

    /// Base realm configuration only
    pub fn config_only() -> Self {
        Self {
            users: false,
            clients: false,
            roles: false,
            groups: false,
            client_scopes: false,
            identity_providers: false,
            role_bindings: false,
            group_memberships: false,
            filter_default_roles: false,
            skip_existing: false,
            strip_realm_entities: true,
        }
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::full()
    }
}

pub struct RealmImporter {
    policy: Arc<ClassificationPolicy>,
}

impl RealmImporter {
    pub fn new(policy: Arc<ClassificationPolicy>) -> Self {
        Self { policy }
    }

    /// Import `snapshot` into the realm it names
    #[instrument(skip_all, fields(realm = snapshot.realm_name().unwrap_or_default()))]
    pub async fn import(
        &self,
        directory: &dyn DirectoryService,
        snapshot: RealmSnapshot,
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let realm = snapshot
            .realm_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidArchive("backup has no realm name".to_string()))?;

        if let Some(report) = self.prepare(directory, &realm, options.skip_existing).await? {
            return Ok(report);
        }

        let record = if options.strip_realm_entities {
            sanitizer::realm_config_only(snapshot.realm.clone())
        } else {
            sanitizer::realm(snapshot.realm.clone())
        };
        create_base_realm(directory, &realm, &record).await?;

        let mut run = ImportRun::new(directory, &realm, &self.policy, options);
        run.replay(&snapshot).await;

        let report = run.finish();
        info!(
            clean = report.is_clean(),
            unresolved = report.unresolved.len(),
            "Realm import finished"
        );
        Ok(report)
    }

    /// Create a realm from a bare realm representation
    #[instrument(skip_all, fields(realm = record.name().unwrap_or_default()))]
    pub async fn import_realm_record(
        &self,
        directory: &dyn DirectoryService,
        record: RealmRecord,
    ) -> Result<ImportReport> {
        let realm = record
            .name()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::InvalidArchive("realm representation has no name".to_string())
            })?;

        if let Some(report) = self.prepare(directory, &realm, false).await? {
            return Ok(report);
        }
        create_base_realm(directory, &realm, &sanitizer::realm(record)).await?;

        info!("Realm created from representation");
        Ok(ImportReport::new(&realm))
    }

    /// Reserved-name guard and existence check. `Some` short-circuits the
    /// import with a skipped report.
    async fn prepare(
        &self,
        directory: &dyn DirectoryService,
        realm: &str,
        skip_existing: bool,
    ) -> Result<Option<ImportReport>> {
        if realm.eq_ignore_ascii_case(RESERVED_REALM) {
            error!("Refusing to import the reserved realm");
            return Err(AppError::ReservedRealm(realm.to_string()));
        }

        if directory.realm_exists(realm).await? {
            if skip_existing {
                info!("Realm already exists, skipping import");
                return Ok(Some(ImportReport::skipped_existing(realm)));
            }
            return Err(AppError::AlreadyExists(realm.to_string()));
        }
        Ok(None)
    }
}

async fn create_base_realm(
    directory: &dyn DirectoryService,
    realm: &str,
    record: &RealmRecord,
) -> Result<()> {
    match directory.create_realm(record).await {
        Ok(()) => {
            info!(realm = %realm, "Base realm created");
            Ok(())
        }
        Err(e) if e.is_conflict() => Err(AppError::AlreadyExists(realm.to_string())),
        Err(e) => {
            error!(realm = %realm, error = %e, "Base realm creation failed");
            Err(e)
        }
    }
}

/// State of one import after the base realm exists
struct ImportRun<'a> {
    directory: &'a dyn DirectoryService,
    realm: &'a str,
    policy: &'a ClassificationPolicy,
    options: &'a ImportOptions,
    clients: ClientIndex,
    groups: HashMap<String, String>,
    groups_loaded: bool,
    report: ImportReport,
}

impl<'a> ImportRun<'a> {
    fn new(
        directory: &'a dyn DirectoryService,
        realm: &'a str,
        policy: &'a ClassificationPolicy,
        options: &'a ImportOptions,
    ) -> Self {
        Self {
            directory,
            realm,
            policy,
            options,
            clients: ClientIndex::default(),
            groups: HashMap::new(),
            groups_loaded: false,
            report: ImportReport::new(realm),
        }
    }

    async fn replay(&mut self, snapshot: &RealmSnapshot) {
        if self.options.client_scopes {
            self.client_scopes(snapshot).await;
        }
        if self.options.clients {
            self.clients(snapshot).await;
        }
        if self.options.roles {
            self.roles(snapshot).await;
            self.role_composites(snapshot).await;
        }
        if self.options.identity_providers {
            self.identity_providers(snapshot).await;
        }
        if self.options.groups {
            self.groups(snapshot).await;
        }
        if self.options.users {
            self.users(snapshot).await;
        }
        if self.options.role_bindings || self.options.group_memberships {
            self.bindings(snapshot).await;
        }
    }

    fn finish(self) -> ImportReport {
        self.report
    }

    fn push(&mut self, stage: StageReport) {
        info!(
            stage = %stage.stage,
            created = stage.created.len(),
            skipped = stage.skipped.len(),
            failed = stage.failed.len(),
            "Import stage complete"
        );
        self.report.stages.push(stage);
    }

    async fn client_scopes(&mut self, snapshot: &RealmSnapshot) {
        let mut stage = StageReport::new(Stage::ClientScopes);
        for scope in &snapshot.client_scopes {
            let scope = sanitizer::client_scope(scope.clone());
            match self.directory.create_client_scope(self.realm, &scope).await {
                Ok(()) => stage.created(&scope.name),
                Err(e) => {
                    warn!(scope = %scope.name, error = %e, "Client scope not imported");
                    stage.failed(&scope.name, &e);
                }
            }
        }
        self.push(stage);
    }

    async fn clients(&mut self, snapshot: &RealmSnapshot) {
        let mut stage = StageReport::new(Stage::Clients);
        for client in &snapshot.clients {
            if self.policy.is_sensitive_client(client.client_id.as_deref()) {
                debug!(client_id = %client.label(), "Skipping sensitive client");
                stage.skipped(client.label(), "sensitive client");
                continue;
            }

            let client = sanitizer::client(client.clone());
            match self.directory.create_client(self.realm, &client).await {
                Ok(uuid) => {
                    if let Some(client_id) = client.client_id.as_deref() {
                        self.clients.insert(client_id, uuid);
                    }
                    stage.created(client.label());
                }
                Err(e) => {
                    warn!(client_id = %client.label(), error = %e, "Client not imported");
                    stage.failed(client.label(), &e);
                }
            }
        }
        self.push(stage);
    }

    /// Flat role creation: realm roles, then each client's roles
    async fn roles(&mut self, snapshot: &RealmSnapshot) {
        let mut stage = StageReport::new(Stage::Roles);

        for role in &snapshot.roles {
            if self.skip_realm_role(role, &mut stage) {
                continue;
            }
            let flat = sanitizer::role(role.clone());
            match self.directory.create_realm_role(self.realm, &flat).await {
                Ok(()) => stage.created(&role.name),
                Err(e) => {
                    warn!(role = %role.name, error = %e, "Realm role not imported");
                    stage.failed(&role.name, &e);
                }
            }
        }

        for (client_id, roles) in &snapshot.client_roles {
            if self.policy.is_sensitive_client(Some(client_id)) {
                continue;
            }
            let Some(uuid) = self
                .clients
                .resolve(self.directory, self.realm, client_id)
                .await
            else {
                for role in roles {
                    stage.skipped(format!("{}/{}", client_id, role.name), "client not present");
                }
                continue;
            };

            for role in roles {
                let label = format!("{}/{}", client_id, role.name);
                let flat = sanitizer::role(role.clone());
                match self
                    .directory
                    .create_client_role(self.realm, &uuid, &flat)
                    .await
                {
                    Ok(()) => stage.created(label),
                    Err(e) => {
                        warn!(role = %label, error = %e, "Client role not imported");
                        stage.failed(label, &e);
                    }
                }
            }
        }

        self.push(stage);
    }

    fn skip_realm_role(&self, role: &RoleRecord, stage: &mut StageReport) -> bool {
        if role.name.trim().is_empty() {
            stage.skipped("<unnamed role>", "missing name");
            return true;
        }
        if self.policy.is_builtin_realm_role(&role.name) {
            debug!(role = %role.name, "Skipping built-in role");
            stage.skipped(&role.name, "built-in role");
            return true;
        }
        if self.options.filter_default_roles && self.policy.is_default_role(&role.name) {
            debug!(role = %role.name, "Skipping default role");
            stage.skipped(&role.name, "default role");
            return true;
        }
        false
    }

    /// Attach composites once every flat role exists
    async fn role_composites(&mut self, snapshot: &RealmSnapshot) {
        let mut stage = StageReport::new(Stage::RoleComposites);
        let mut unresolved = Vec::new();
        let resolver = RoleCompositeResolver::new(self.directory, self.realm);

        for role in &snapshot.roles {
            if self.policy.is_builtin_realm_role(&role.name)
                || (self.options.filter_default_roles && self.policy.is_default_role(&role.name))
            {
                continue;
            }
            resolver
                .wire(
                    CompositeOwner::Realm,
                    role,
                    &mut self.clients,
                    &mut stage,
                    &mut unresolved,
                )
                .await;
        }

        for (client_id, roles) in &snapshot.client_roles {
            if self.policy.is_sensitive_client(Some(client_id))
                || roles.iter().all(|r| r.declared_composites().is_none())
            {
                continue;
            }
            let Some(uuid) = self
                .clients
                .resolve(self.directory, self.realm, client_id)
                .await
            else {
                continue;
            };
            for role in roles {
                resolver
                    .wire(
                        CompositeOwner::Client {
                            client_id,
                            uuid: &uuid,
                        },
                        role,
                        &mut self.clients,
                        &mut stage,
                        &mut unresolved,
                    )
                    .await;
            }
        }

        self.report.unresolved.extend(unresolved);
        self.push(stage);
    }

    async fn identity_providers(&mut self, snapshot: &RealmSnapshot) {
        let mut stage = StageReport::new(Stage::IdentityProviders);
        for provider in &snapshot.identity_providers {
            let provider = sanitizer::identity_provider(provider.clone());
            match self
                .directory
                .create_identity_provider(self.realm, &provider)
                .await
            {
                Ok(()) => stage.created(&provider.alias),
                Err(e) => {
                    warn!(alias = %provider.alias, error = %e, "Identity provider not imported");
                    stage.failed(&provider.alias, &e);
                }
            }
        }
        self.push(stage);
    }

    /// Parents are created before their children; a child whose parent
    /// failed is skipped.
    async fn groups(&mut self, snapshot: &RealmSnapshot) {
        let mut stage = StageReport::new(Stage::Groups);
        let mut pending: Vec<(Option<String>, String, GroupRecord)> = snapshot
            .groups
            .iter()
            .rev()
            .map(|g| (None, String::new(), sanitizer::group(g.clone())))
            .collect();

        while let Some((parent_id, parent_path, mut group)) = pending.pop() {
            let path = format!("{}/{}", parent_path, group.name);
            let children = std::mem::take(&mut group.sub_groups);

            let created = match parent_id.as_deref() {
                None => self.directory.create_group(self.realm, &group).await,
                Some(parent) => {
                    self.directory
                        .create_child_group(self.realm, parent, &group)
                        .await
                }
            };

            match created {
                Ok(id) => {
                    stage.created(&path);
                    self.groups.entry(group.name.clone()).or_insert_with(|| id.clone());
                    self.groups.insert(path.clone(), id.clone());
                    for child in children.into_iter().rev() {
                        pending.push((Some(id.clone()), path.clone(), child));
                    }
                }
                Err(e) => {
                    warn!(group = %path, error = %e, "Group not imported");
                    stage.failed(&path, &e);
                    for child in children {
                        stage.skipped(format!("{}/{}", path, child.name), "parent group not created");
                    }
                }
            }
        }
        self.push(stage);
    }

    async fn users(&mut self, snapshot: &RealmSnapshot) {
        let mut stage = StageReport::new(Stage::Users);
        for user in &snapshot.users {
            if user.username.as_deref().map_or(true, |u| u.trim().is_empty()) {
                stage.skipped(user.label(), "missing username");
                continue;
            }
            let user = sanitizer::user(user.clone());
            match self.directory.create_user(self.realm, &user).await {
                Ok(_) => stage.created(user.label()),
                Err(e) => {
                    warn!(user = %user.label(), error = %e, "User not imported");
                    stage.failed(user.label(), &e);
                }
            }
        }
        self.push(stage);
    }

    /// Replay realm roles, client roles and group memberships per user, as
    /// far as the options allow
    async fn bindings(&mut self, snapshot: &RealmSnapshot) {
        let mut stage = StageReport::new(Stage::RoleBindings);
        for entry in &snapshot.users_with_roles {
            let Some(username) = entry.username.as_deref().filter(|u| !u.trim().is_empty()) else {
                stage.skipped("<unnamed user>", "missing username");
                continue;
            };
            let Some(user_id) = self.find_user(username).await else {
                warn!(user = %username, "User not found for binding replay");
                self.report
                    .unresolved
                    .push(UnresolvedReference::new(username, ReferenceKind::User, username));
                continue;
            };

            let failures = self.bind_user(username, &user_id, entry).await;
            if failures.is_empty() {
                stage.created(username);
            } else {
                for e in failures {
                    stage.failed(username, &e);
                }
            }
        }
        self.push(stage);
    }

    async fn find_user(&self, username: &str) -> Option<String> {
        match self
            .directory
            .search_users_by_username(self.realm, username)
            .await
        {
            Ok(users) => users
                .into_iter()
                .find(|u| {
                    u.username
                        .as_deref()
                        .is_some_and(|name| name.eq_ignore_ascii_case(username))
                })
                .and_then(|u| u.id),
            Err(e) => {
                warn!(user = %username, error = %e, "User lookup failed");
                None
            }
        }
    }

    /// Returns the assignment errors; unresolved names go to the report
    async fn bind_user(
        &mut self,
        username: &str,
        user_id: &str,
        entry: &UserWithRolesRecord,
    ) -> Vec<AppError> {
        let mut failures = Vec::new();

        if self.options.role_bindings {
            self.bind_roles(username, user_id, entry, &mut failures).await;
        }
        if self.options.group_memberships {
            self.bind_groups(username, user_id, entry, &mut failures).await;
        }

        failures
    }

    async fn bind_roles(
        &mut self,
        username: &str,
        user_id: &str,
        entry: &UserWithRolesRecord,
        failures: &mut Vec<AppError>,
    ) {
        let mut realm_roles = Vec::new();
        for name in &entry.realm_roles {
            if self.policy.is_default_role(name) {
                continue;
            }
            match self.directory.get_realm_role(self.realm, name).await {
                Ok(role) => realm_roles.push(role),
                Err(e) => {
                    warn!(user = %username, role = %name, error = %e, "Realm role not found");
                    self.report
                        .unresolved
                        .push(UnresolvedReference::new(username, ReferenceKind::RealmRole, name));
                }
            }
        }
        if !realm_roles.is_empty() {
            match self
                .directory
                .add_user_realm_roles(self.realm, user_id, &realm_roles)
                .await
            {
                Ok(()) => debug!(user = %username, count = realm_roles.len(), "Realm roles assigned"),
                Err(e) => failures.push(e),
            }
        }

        for (client_id, names) in &entry.client_roles {
            if names.is_empty() {
                continue;
            }
            let Some(uuid) = self
                .clients
                .resolve(self.directory, self.realm, client_id)
                .await
            else {
                warn!(user = %username, client_id = %client_id, "Client not found, skipping its bindings");
                self.report
                    .unresolved
                    .push(UnresolvedReference::new(username, ReferenceKind::Client, client_id));
                continue;
            };

            let mut roles = Vec::new();
            for name in names {
                match self.directory.get_client_role(self.realm, &uuid, name).await {
                    Ok(role) => roles.push(role),
                    Err(e) => {
                        warn!(user = %username, client_id = %client_id, role = %name, error = %e, "Client role not found");
                        self.report
                            .unresolved
                            .push(UnresolvedReference::client_role(username, client_id, name));
                    }
                }
            }
            if !roles.is_empty() {
                if let Err(e) = self
                    .directory
                    .add_user_client_roles(self.realm, user_id, &uuid, &roles)
                    .await
                {
                    failures.push(e);
                }
            }
        }
    }

    async fn bind_groups(
        &mut self,
        username: &str,
        user_id: &str,
        entry: &UserWithRolesRecord,
        failures: &mut Vec<AppError>,
    ) {
        for group in &entry.groups {
            let Some(group_id) = self.find_group(group).await else {
                warn!(user = %username, group = %group, "Group not found");
                self.report
                    .unresolved
                    .push(UnresolvedReference::new(username, ReferenceKind::Group, group));
                continue;
            };
            if let Err(e) = self
                .directory
                .add_user_to_group(self.realm, user_id, &group_id)
                .await
            {
                failures.push(e);
            }
        }
    }

    /// Group id by name or path, loading the realm's groups once on a miss
    async fn find_group(&mut self, name: &str) -> Option<String> {
        if let Some(id) = self.groups.get(name) {
            return Some(id.clone());
        }
        if !self.groups_loaded {
            self.groups_loaded = true;
            match self.directory.list_groups(self.realm).await {
                Ok(groups) => index_groups(&mut self.groups, "", &groups),
                Err(e) => warn!(error = %e, "Failed to list groups for membership replay"),
            }
        }
        self.groups.get(name).cloned()
    }
}

/// Index a group tree by name (first wins) and by full path
fn index_groups(index: &mut HashMap<String, String>, parent_path: &str, groups: &[GroupRecord]) {
    for group in groups {
        let path = format!("{}/{}", parent_path, group.name);
        if let Some(id) = &group.id {
            index.entry(group.name.clone()).or_insert_with(|| id.clone());
            index.insert(path.clone(), id.clone());
        }
        index_groups(index, &path, &group.sub_groups);
    }
}
