//! Composite-role wiring and by-clientId lookups for the import pipeline

use super::report::{ReferenceKind, StageReport, UnresolvedReference};
use crate::domain::{RoleComposites, RoleRecord};
use crate::keycloak::DirectoryService;
use std::collections::HashMap;
use tracing::{debug, warn};

/// clientId → backend id cache for one target realm.
///
/// Misses are cached too, so a client that failed to import is looked up
/// once. Lookup errors are not cached; the next reference asks again.
#[derive(Debug, Default)]
pub struct ClientIndex {
    ids: HashMap<String, Option<String>>,
}

impl ClientIndex {
    pub fn insert(&mut self, client_id: &str, uuid: String) {
        self.ids.insert(client_id.to_string(), Some(uuid));
    }

    /// Backend id for `client_id`, asking the directory on first use
    pub async fn resolve(
        &mut self,
        directory: &dyn DirectoryService,
        realm: &str,
        client_id: &str,
    ) -> Option<String> {
        if let Some(cached) = self.ids.get(client_id) {
            return cached.clone();
        }

        match directory.find_clients_by_client_id(realm, client_id).await {
            Ok(clients) => {
                let found = clients
                    .into_iter()
                    .find(|c| c.client_id.as_deref() == Some(client_id))
                    .and_then(|c| c.id);
                self.ids.insert(client_id.to_string(), found.clone());
                found
            }
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Client lookup failed");
                None
            }
        }
    }
}

/// Role that owns a set of composites
#[derive(Debug, Clone, Copy)]
pub enum CompositeOwner<'a> {
    Realm,
    Client { client_id: &'a str, uuid: &'a str },
}

/// Attaches composites to roles once every flat role exists.
pub struct RoleCompositeResolver<'a> {
    directory: &'a dyn DirectoryService,
    realm: &'a str,
}

impl<'a> RoleCompositeResolver<'a> {
    pub fn new(directory: &'a dyn DirectoryService, realm: &'a str) -> Self {
        Self { directory, realm }
    }

    /// Resolve `role`'s declared composites and attach the ones found.
    ///
    /// Targets that cannot be found are appended to `unresolved`; the rest
    /// are still attached as one batch.
    pub async fn wire(
        &self,
        owner: CompositeOwner<'_>,
        role: &RoleRecord,
        clients: &mut ClientIndex,
        stage: &mut StageReport,
        unresolved: &mut Vec<UnresolvedReference>,
    ) {
        let Some(composites) = role.declared_composites() else {
            return;
        };
        let label = match owner {
            CompositeOwner::Realm => role.name.clone(),
            CompositeOwner::Client { client_id, .. } => format!("{}/{}", client_id, role.name),
        };

        let targets = self
            .resolve_targets(&label, composites, clients, unresolved)
            .await;
        if targets.is_empty() {
            stage.skipped(label, "no composite targets resolved");
            return;
        }

        let result = match owner {
            CompositeOwner::Realm => {
                self.directory
                    .add_realm_role_composites(self.realm, &role.name, &targets)
                    .await
            }
            CompositeOwner::Client { uuid, .. } => {
                self.directory
                    .add_client_role_composites(self.realm, uuid, &role.name, &targets)
                    .await
            }
        };

        match result {
            Ok(()) => {
                debug!(role = %label, count = targets.len(), "Attached composites");
                stage.created(label);
            }
            Err(e) => {
                warn!(role = %label, error = %e, "Failed to attach composites");
                stage.failed(label, &e);
            }
        }
    }

    async fn resolve_targets(
        &self,
        owner: &str,
        composites: &RoleComposites,
        clients: &mut ClientIndex,
        unresolved: &mut Vec<UnresolvedReference>,
    ) -> Vec<RoleRecord> {
        let mut targets = Vec::new();

        for target in &composites.realm {
            match self.directory.get_realm_role(self.realm, &target.0).await {
                Ok(found) => targets.push(found),
                Err(e) => {
                    warn!(role = %owner, composite = %target.0, error = %e, "Composite realm role not found");
                    unresolved.push(UnresolvedReference::new(
                        owner,
                        ReferenceKind::RealmRole,
                        &target.0,
                    ));
                }
            }
        }

        for (client_id, refs) in &composites.client {
            if refs.is_empty() {
                continue;
            }
            let Some(uuid) = clients.resolve(self.directory, self.realm, client_id).await else {
                warn!(role = %owner, client_id = %client_id, "Composite client not found");
                unresolved.push(UnresolvedReference::new(
                    owner,
                    ReferenceKind::Client,
                    client_id,
                ));
                continue;
            };

            for target in refs {
                match self
                    .directory
                    .get_client_role(self.realm, &uuid, &target.0)
                    .await
                {
                    Ok(found) => targets.push(found),
                    Err(e) => {
                        warn!(role = %owner, client_id = %client_id, composite = %target.0, error = %e, "Composite client role not found");
                        unresolved.push(UnresolvedReference::client_role(
                            owner, client_id, &target.0,
                        ));
                    }
                }
            }
        }

        targets
    }
}
