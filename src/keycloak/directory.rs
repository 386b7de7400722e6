//! Directory-service seam consumed by the export and import pipelines.
//!
//! Every call names its realm explicitly; implementations hold no per-realm
//! state, so one handle can serve many operations.

use crate::domain::{
    ClientRecord, ClientScopeRecord, EventsConfigRecord, GroupRecord, IdentityProviderRecord,
    RealmRecord, RoleRecord, UserRecord,
};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryService: Send + Sync {
    // Realms

    async fn list_realms(&self) -> Result<Vec<RealmRecord>>;

    async fn get_realm(&self, realm: &str) -> Result<RealmRecord>;

    /// `false` only on a definite not-found; other failures propagate.
    async fn realm_exists(&self, realm: &str) -> Result<bool>;

    async fn create_realm(&self, record: &RealmRecord) -> Result<()>;

    // Clients

    async fn list_clients(&self, realm: &str) -> Result<Vec<ClientRecord>>;

    async fn find_clients_by_client_id(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<Vec<ClientRecord>>;

    /// Returns the backend id of the created client
    async fn create_client(&self, realm: &str, client: &ClientRecord) -> Result<String>;

    async fn get_authorization_settings(&self, realm: &str, client_uuid: &str) -> Result<Value>;

    // Realm roles

    async fn list_realm_roles(&self, realm: &str) -> Result<Vec<RoleRecord>>;

    async fn get_realm_role(&self, realm: &str, name: &str) -> Result<RoleRecord>;

    async fn create_realm_role(&self, realm: &str, role: &RoleRecord) -> Result<()>;

    /// Direct composites of a role (realm- or client-level) by backend id
    async fn list_role_composites(&self, realm: &str, role_id: &str) -> Result<Vec<RoleRecord>>;

    async fn add_realm_role_composites(
        &self,
        realm: &str,
        role_name: &str,
        composites: &[RoleRecord],
    ) -> Result<()>;

    // Client roles

    async fn list_client_roles(&self, realm: &str, client_uuid: &str) -> Result<Vec<RoleRecord>>;

    async fn get_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<RoleRecord>;

    async fn create_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        role: &RoleRecord,
    ) -> Result<()>;

    async fn add_client_role_composites(
        &self,
        realm: &str,
        client_uuid: &str,
        role_name: &str,
        composites: &[RoleRecord],
    ) -> Result<()>;

    // Groups

    /// Top-level groups with their sub-group trees
    async fn list_groups(&self, realm: &str) -> Result<Vec<GroupRecord>>;

    async fn create_group(&self, realm: &str, group: &GroupRecord) -> Result<String>;

    async fn create_child_group(
        &self,
        realm: &str,
        parent_id: &str,
        group: &GroupRecord,
    ) -> Result<String>;

    // Identity providers

    async fn list_identity_providers(&self, realm: &str) -> Result<Vec<IdentityProviderRecord>>;

    async fn create_identity_provider(
        &self,
        realm: &str,
        provider: &IdentityProviderRecord,
    ) -> Result<()>;

    // Client scopes

    async fn list_client_scopes(&self, realm: &str) -> Result<Vec<ClientScopeRecord>>;

    async fn create_client_scope(&self, realm: &str, scope: &ClientScopeRecord) -> Result<()>;

    // Events

    async fn get_events_config(&self, realm: &str) -> Result<EventsConfigRecord>;

    // Users

    async fn list_users(&self, realm: &str, first: u32, max: u32) -> Result<Vec<UserRecord>>;

    /// Returns the backend id of the created user
    async fn create_user(&self, realm: &str, user: &UserRecord) -> Result<String>;

    /// Exact username match
    async fn search_users_by_username(&self, realm: &str, username: &str)
        -> Result<Vec<UserRecord>>;

    /// Directly assigned realm roles (no composite expansion)
    async fn list_user_realm_roles(&self, realm: &str, user_id: &str) -> Result<Vec<RoleRecord>>;

    async fn list_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client_uuid: &str,
    ) -> Result<Vec<RoleRecord>>;

    async fn list_user_groups(&self, realm: &str, user_id: &str) -> Result<Vec<GroupRecord>>;

    async fn add_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRecord],
    ) -> Result<()>;

    async fn add_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client_uuid: &str,
        roles: &[RoleRecord],
    ) -> Result<()>;

    async fn add_user_to_group(&self, realm: &str, user_id: &str, group_id: &str) -> Result<()>;
}
