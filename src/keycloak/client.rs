//! Keycloak Admin API client
//!
//! Speaks the Keycloak Admin REST API on behalf of the backup pipeline. It
//! handles admin authentication with token caching and maps HTTP statuses
//! onto [`AppError`] variants: 404 becomes `NotFound`, 409 becomes `Conflict`,
//! anything else non-2xx becomes `Keycloak`.

use super::directory::DirectoryService;
use crate::config::KeycloakConfig;
use crate::domain::{
    ClientRecord, ClientScopeRecord, EventsConfigRecord, GroupRecord, IdentityProviderRecord,
    RealmRecord, RoleRecord, UserRecord,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use urlencoding::encode;

/// Keycloak Admin API client
#[derive(Clone)]
pub struct KeycloakClient {
    config: KeycloakConfig,
    http_client: Client,
    token: Arc<RwLock<Option<AdminToken>>>,
}

#[derive(Debug, Clone)]
struct AdminToken {
    access_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

type GroupTreeFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

impl KeycloakClient {
    /// Create a new Keycloak client.
    ///
    /// Requests carry no timeout unless `timeout_secs` is configured.
    pub fn new(config: KeycloakConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| AppError::Keycloak(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Base URL of the Keycloak server
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Get admin access token (with caching)
    async fn get_admin_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(ref t) = *token {
                if t.expires_at > chrono::Utc::now() + chrono::Duration::seconds(30) {
                    return Ok(t.access_token.clone());
                }
            }
        }

        let token_url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.config.url,
            encode(&self.config.admin_realm)
        );

        let mut params = vec![
            ("grant_type", "password"),
            ("client_id", self.config.admin_client_id.as_str()),
            ("username", self.config.admin_username.as_str()),
            ("password", self.config.admin_password.as_str()),
        ];
        if !self.config.admin_client_secret.is_empty() {
            params.push(("client_secret", self.config.admin_client_secret.as_str()));
        }

        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Keycloak(format!("Failed to get admin token: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Keycloak(format!(
                "Failed to get admin token: {} - {}",
                status, body
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Keycloak(format!("Failed to parse token response: {}", e)))?;

        let admin_token = AdminToken {
            access_token: token_response.access_token.clone(),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(token_response.expires_in),
        };

        {
            let mut token = self.token.write().await;
            *token = Some(admin_token);
        }

        Ok(token_response.access_token)
    }

    // ============================================================================
    // Request helpers
    // ============================================================================

    fn realm_url(&self, realm: &str, path: &str) -> String {
        format!("{}/admin/realms/{}{}", self.config.url, encode(realm), path)
    }

    async fn send(&self, op: &str, request: RequestBuilder) -> Result<Response> {
        let token = self.get_admin_token().await?;
        let response = request
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AppError::Keycloak(format!("Failed to {}: {}", op, e)))?;

        check_status(op, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, op: &str, url: &str) -> Result<T> {
        let response = self.send(op, self.http_client.get(url)).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Keycloak(format!("Failed to parse {} response: {}", op, e)))
    }

    async fn post_json<B: Serialize + ?Sized + Sync>(
        &self,
        op: &str,
        url: &str,
        body: &B,
    ) -> Result<Response> {
        self.send(op, self.http_client.post(url).json(body)).await
    }

    /// POST and return the id of the created resource from `Location`
    async fn post_created<B: Serialize + ?Sized + Sync>(
        &self,
        op: &str,
        url: &str,
        body: &B,
    ) -> Result<String> {
        let response = self.post_json(op, url, body).await?;
        created_id(&response)
    }

    fn fill_sub_groups<'a>(
        &'a self,
        realm: &'a str,
        groups: &'a mut [GroupRecord],
    ) -> GroupTreeFuture<'a> {
        Box::pin(async move {
            for group in groups.iter_mut() {
                let has_children = group
                    .extra
                    .get("subGroupCount")
                    .and_then(Value::as_u64)
                    .is_some_and(|count| count > 0);
                if group.sub_groups.is_empty() && has_children {
                    if let Some(id) = group.id.clone() {
                        let url = self.realm_url(
                            realm,
                            &format!("/groups/{}/children?briefRepresentation=false", encode(&id)),
                        );
                        group.sub_groups = self.get_json("list child groups", &url).await?;
                    }
                }
                self.fill_sub_groups(realm, &mut group.sub_groups).await?;
            }
            Ok(())
        })
    }
}

async fn check_status(op: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(AppError::NotFound(format!("{}: {}", op, body))),
        StatusCode::CONFLICT => Err(AppError::Conflict(format!("{}: {}", op, body))),
        _ => Err(AppError::Keycloak(format!(
            "Failed to {}: {} - {}",
            op, status, body
        ))),
    }
}

fn created_id(response: &Response) -> Result<String> {
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Keycloak("Missing location header".to_string()))?;

    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Keycloak("Invalid location header".to_string()))
}

#[async_trait]
impl DirectoryService for KeycloakClient {
    async fn list_realms(&self) -> Result<Vec<RealmRecord>> {
        let url = format!("{}/admin/realms", self.config.url);
        self.get_json("list realms", &url).await
    }

    async fn get_realm(&self, realm: &str) -> Result<RealmRecord> {
        self.get_json("get realm", &self.realm_url(realm, "")).await
    }

    async fn realm_exists(&self, realm: &str) -> Result<bool> {
        match self.get_realm(realm).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_realm(&self, record: &RealmRecord) -> Result<()> {
        let url = format!("{}/admin/realms", self.config.url);
        self.post_json("create realm", &url, record).await?;
        Ok(())
    }

    async fn list_clients(&self, realm: &str) -> Result<Vec<ClientRecord>> {
        self.get_json("list clients", &self.realm_url(realm, "/clients"))
            .await
    }

    async fn find_clients_by_client_id(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<Vec<ClientRecord>> {
        let url = self.realm_url(realm, &format!("/clients?clientId={}", encode(client_id)));
        self.get_json("find client", &url).await
    }

    async fn create_client(&self, realm: &str, client: &ClientRecord) -> Result<String> {
        self.post_created("create client", &self.realm_url(realm, "/clients"), client)
            .await
    }

    async fn get_authorization_settings(&self, realm: &str, client_uuid: &str) -> Result<Value> {
        let url = self.realm_url(
            realm,
            &format!("/clients/{}/authz/resource-server/settings", encode(client_uuid)),
        );
        self.get_json("get authorization settings", &url).await
    }

    async fn list_realm_roles(&self, realm: &str) -> Result<Vec<RoleRecord>> {
        let url = self.realm_url(realm, "/roles?briefRepresentation=false");
        self.get_json("list realm roles", &url).await
    }

    async fn get_realm_role(&self, realm: &str, name: &str) -> Result<RoleRecord> {
        let url = self.realm_url(realm, &format!("/roles/{}", encode(name)));
        self.get_json("get realm role", &url).await
    }

    async fn create_realm_role(&self, realm: &str, role: &RoleRecord) -> Result<()> {
        self.post_json("create realm role", &self.realm_url(realm, "/roles"), role)
            .await?;
        Ok(())
    }

    async fn list_role_composites(&self, realm: &str, role_id: &str) -> Result<Vec<RoleRecord>> {
        let url = self.realm_url(realm, &format!("/roles-by-id/{}/composites", encode(role_id)));
        self.get_json("list role composites", &url).await
    }

    async fn add_realm_role_composites(
        &self,
        realm: &str,
        role_name: &str,
        composites: &[RoleRecord],
    ) -> Result<()> {
        let url = self.realm_url(realm, &format!("/roles/{}/composites", encode(role_name)));
        self.post_json("add realm role composites", &url, composites)
            .await?;
        Ok(())
    }

    async fn list_client_roles(&self, realm: &str, client_uuid: &str) -> Result<Vec<RoleRecord>> {
        let url = self.realm_url(
            realm,
            &format!("/clients/{}/roles?briefRepresentation=false", encode(client_uuid)),
        );
        self.get_json("list client roles", &url).await
    }

    async fn get_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<RoleRecord> {
        let url = self.realm_url(
            realm,
            &format!("/clients/{}/roles/{}", encode(client_uuid), encode(name)),
        );
        self.get_json("get client role", &url).await
    }

    async fn create_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        role: &RoleRecord,
    ) -> Result<()> {
        let url = self.realm_url(realm, &format!("/clients/{}/roles", encode(client_uuid)));
        self.post_json("create client role", &url, role).await?;
        Ok(())
    }

    async fn add_client_role_composites(
        &self,
        realm: &str,
        client_uuid: &str,
        role_name: &str,
        composites: &[RoleRecord],
    ) -> Result<()> {
        let url = self.realm_url(
            realm,
            &format!(
                "/clients/{}/roles/{}/composites",
                encode(client_uuid),
                encode(role_name)
            ),
        );
        self.post_json("add client role composites", &url, composites)
            .await?;
        Ok(())
    }

    async fn list_groups(&self, realm: &str) -> Result<Vec<GroupRecord>> {
        let url = self.realm_url(realm, "/groups?briefRepresentation=false");
        let mut groups: Vec<GroupRecord> = self.get_json("list groups", &url).await?;
        self.fill_sub_groups(realm, &mut groups).await?;
        Ok(groups)
    }

    async fn create_group(&self, realm: &str, group: &GroupRecord) -> Result<String> {
        self.post_created("create group", &self.realm_url(realm, "/groups"), group)
            .await
    }

    async fn create_child_group(
        &self,
        realm: &str,
        parent_id: &str,
        group: &GroupRecord,
    ) -> Result<String> {
        let url = self.realm_url(realm, &format!("/groups/{}/children", encode(parent_id)));
        self.post_created("create child group", &url, group).await
    }

    async fn list_identity_providers(&self, realm: &str) -> Result<Vec<IdentityProviderRecord>> {
        let url = self.realm_url(realm, "/identity-provider/instances");
        self.get_json("list identity providers", &url).await
    }

    async fn create_identity_provider(
        &self,
        realm: &str,
        provider: &IdentityProviderRecord,
    ) -> Result<()> {
        let url = self.realm_url(realm, "/identity-provider/instances");
        self.post_json("create identity provider", &url, provider)
            .await?;
        Ok(())
    }

    async fn list_client_scopes(&self, realm: &str) -> Result<Vec<ClientScopeRecord>> {
        self.get_json("list client scopes", &self.realm_url(realm, "/client-scopes"))
            .await
    }

    async fn create_client_scope(&self, realm: &str, scope: &ClientScopeRecord) -> Result<()> {
        let url = self.realm_url(realm, "/client-scopes");
        self.post_json("create client scope", &url, scope).await?;
        Ok(())
    }

    async fn get_events_config(&self, realm: &str) -> Result<EventsConfigRecord> {
        self.get_json("get events config", &self.realm_url(realm, "/events/config"))
            .await
    }

    async fn list_users(&self, realm: &str, first: u32, max: u32) -> Result<Vec<UserRecord>> {
        let url = self.realm_url(
            realm,
            &format!("/users?first={}&max={}&briefRepresentation=false", first, max),
        );
        self.get_json("list users", &url).await
    }

    async fn create_user(&self, realm: &str, user: &UserRecord) -> Result<String> {
        self.post_created("create user", &self.realm_url(realm, "/users"), user)
            .await
    }

    async fn search_users_by_username(
        &self,
        realm: &str,
        username: &str,
    ) -> Result<Vec<UserRecord>> {
        let url = self.realm_url(
            realm,
            &format!("/users?username={}&exact=true", encode(username)),
        );
        self.get_json("search users", &url).await
    }

    async fn list_user_realm_roles(&self, realm: &str, user_id: &str) -> Result<Vec<RoleRecord>> {
        let url = self.realm_url(
            realm,
            &format!("/users/{}/role-mappings/realm", encode(user_id)),
        );
        self.get_json("list user realm roles", &url).await
    }

    async fn list_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client_uuid: &str,
    ) -> Result<Vec<RoleRecord>> {
        let url = self.realm_url(
            realm,
            &format!(
                "/users/{}/role-mappings/clients/{}",
                encode(user_id),
                encode(client_uuid)
            ),
        );
        self.get_json("list user client roles", &url).await
    }

    async fn list_user_groups(&self, realm: &str, user_id: &str) -> Result<Vec<GroupRecord>> {
        let url = self.realm_url(realm, &format!("/users/{}/groups", encode(user_id)));
        self.get_json("list user groups", &url).await
    }

    async fn add_user_realm_roles(
        &self,
        realm: &str,
        user_id: &str,
        roles: &[RoleRecord],
    ) -> Result<()> {
        let url = self.realm_url(
            realm,
            &format!("/users/{}/role-mappings/realm", encode(user_id)),
        );
        self.post_json("assign realm roles", &url, roles).await?;
        Ok(())
    }

    async fn add_user_client_roles(
        &self,
        realm: &str,
        user_id: &str,
        client_uuid: &str,
        roles: &[RoleRecord],
    ) -> Result<()> {
        let url = self.realm_url(
            realm,
            &format!(
                "/users/{}/role-mappings/clients/{}",
                encode(user_id),
                encode(client_uuid)
            ),
        );
        self.post_json("assign client roles", &url, roles).await?;
        Ok(())
    }

    async fn add_user_to_group(&self, realm: &str, user_id: &str, group_id: &str) -> Result<()> {
        let url = self.realm_url(
            realm,
            &format!("/users/{}/groups/{}", encode(user_id), encode(group_id)),
        );
        self.send("add user to group", self.http_client.put(&url))
            .await?;
        Ok(())
    }
}
