//! Domain endpoints layered over [`ApiClient`].
//!
//! Each service is a thin wrapper that fixes a path prefix and a cache
//! lifetime per endpoint. Services are constructed with the client they use
//! rather than reaching for a shared global.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::storage::{KeyValueStore, StorageError};

use super::client::ApiClient;
use super::error::ApiError;
use super::types::{FilePart, QueryParams, RequestOptions, ResponseEnvelope};

const AUTH_TOKEN_KEY: &str = "auth_token";
const USER_INFO_KEY: &str = "user_info";

#[derive(Debug, Error)]
pub enum ServiceError {
  #[error(transparent)]
  Api(#[from] ApiError),
  #[error(transparent)]
  Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub avatar: Option<String>,
  pub role: String,
  pub created_at: String,
  pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  Asc,
  Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationParams {
  pub page: Option<u32>,
  pub page_size: Option<u32>,
  pub sort_by: Option<String>,
  pub sort_order: Option<SortOrder>,
}

impl PaginationParams {
  pub fn to_query(&self) -> QueryParams {
    let mut params = QueryParams::new();
    params.push_opt("page", self.page);
    params.push_opt("pageSize", self.page_size);
    params.push_opt("sortBy", self.sort_by.clone());
    params.push_opt(
      "sortOrder",
      self.sort_order.map(|o| match o {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
      }),
    );
    params
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
  pub items: Vec<T>,
  pub total: u64,
  pub page: u32,
  pub page_size: u32,
  pub total_pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
  Csv,
  Excel,
  Json,
}

impl ExportFormat {
  fn as_str(&self) -> &'static str {
    match self {
      ExportFormat::Csv => "csv",
      ExportFormat::Excel => "excel",
      ExportFormat::Json => "json",
    }
  }
}

fn cached_for(secs: u64) -> RequestOptions {
  RequestOptions::cached(Duration::from_secs(secs))
}

// ============================================================================
// Users
// ============================================================================

#[derive(Clone)]
pub struct UserService {
  client: ApiClient,
}

impl UserService {
  const BASE_PATH: &'static str = "users";

  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn get_users(&self, params: &PaginationParams) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .get(Self::BASE_PATH, params.to_query(), cached_for(2 * 60))
      .await
  }

  pub async fn get_user(&self, id: &str) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .get(
        &format!("{}/{}", Self::BASE_PATH, id),
        QueryParams::new(),
        cached_for(5 * 60),
      )
      .await
  }

  pub async fn create_user(&self, user: Value) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .post(Self::BASE_PATH, Some(user), RequestOptions::new())
      .await
  }

  pub async fn update_user(&self, id: &str, changes: Value) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .put(
        &format!("{}/{}", Self::BASE_PATH, id),
        Some(changes),
        RequestOptions::new(),
      )
      .await
  }

  pub async fn delete_user(&self, id: &str) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .delete(&format!("{}/{}", Self::BASE_PATH, id), RequestOptions::new())
      .await
  }

  pub async fn upload_avatar(&self, id: &str, file: FilePart) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .upload(
        &format!("{}/{}/avatar", Self::BASE_PATH, id),
        file,
        RequestOptions::new(),
      )
      .await
  }
}

// ============================================================================
// Auth
// ============================================================================

/// Login state lives in the client's bearer header and is mirrored into a
/// key-value store so it survives restarts.
#[derive(Clone)]
pub struct AuthService {
  client: ApiClient,
  store: Arc<dyn KeyValueStore>,
}

impl AuthService {
  const BASE_PATH: &'static str = "auth";

  pub fn new(client: ApiClient, store: Arc<dyn KeyValueStore>) -> Self {
    Self { client, store }
  }

  fn path(endpoint: &str) -> String {
    format!("{}/{}", Self::BASE_PATH, endpoint)
  }

  /// Re-apply a previously persisted token. Returns whether one was found.
  pub fn restore_session(&self) -> Result<bool, StorageError> {
    match self.store.get(AUTH_TOKEN_KEY)? {
      Some(token) => {
        self.client.set_auth_token(&token);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  pub async fn login(&self, email: &str, password: &str) -> Result<ResponseEnvelope, ServiceError> {
    let response = self
      .client
      .post(
        &Self::path("login"),
        Some(json!({ "email": email, "password": password })),
        RequestOptions::new(),
      )
      .await?;

    if response.success {
      if let Some(token) = response.data.get("token").and_then(Value::as_str) {
        self.client.set_auth_token(token);
        self.store.set(AUTH_TOKEN_KEY, token)?;
        if let Some(user) = response.data.get("user") {
          self.store.set(USER_INFO_KEY, &user.to_string())?;
        }
        info!("Logged in as {}", email);
      }
    }

    Ok(response)
  }

  pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .post(
        &Self::path("register"),
        Some(json!({ "name": name, "email": email, "password": password })),
        RequestOptions::new(),
      )
      .await
  }

  /// Tell the server, then drop the token locally whatever it answered.
  pub async fn logout(&self) -> Result<ResponseEnvelope, ServiceError> {
    let response = self
      .client
      .post(&Self::path("logout"), None, RequestOptions::new())
      .await;

    self.client.remove_auth_token();
    self.store.remove(AUTH_TOKEN_KEY)?;
    self.store.remove(USER_INFO_KEY)?;

    Ok(response?)
  }

  pub async fn refresh_token(&self) -> Result<ResponseEnvelope, ServiceError> {
    let response = self
      .client
      .post(&Self::path("refresh"), None, RequestOptions::new())
      .await?;

    if response.success {
      if let Some(token) = response.data.get("token").and_then(Value::as_str) {
        self.client.set_auth_token(token);
        self.store.set(AUTH_TOKEN_KEY, token)?;
      }
    }

    Ok(response)
  }

  pub async fn current_user(&self) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .get(&Self::path("me"), QueryParams::new(), cached_for(60))
      .await
  }

  pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .post(
        &Self::path("change-password"),
        Some(json!({ "oldPassword": old_password, "newPassword": new_password })),
        RequestOptions::new(),
      )
      .await
  }

  pub async fn forgot_password(&self, email: &str) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .post(
        &Self::path("forgot-password"),
        Some(json!({ "email": email })),
        RequestOptions::new(),
      )
      .await
  }

  pub async fn reset_password(&self, token: &str, password: &str) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .post(
        &Self::path("reset-password"),
        Some(json!({ "token": token, "password": password })),
        RequestOptions::new(),
      )
      .await
  }
}

// ============================================================================
// Data
// ============================================================================

#[derive(Clone)]
pub struct DataService {
  client: ApiClient,
}

impl DataService {
  const BASE_PATH: &'static str = "data";

  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn dashboard(&self) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .get(
        &format!("{}/dashboard", Self::BASE_PATH),
        QueryParams::new(),
        cached_for(30),
      )
      .await
  }

  pub async fn chart_data(&self, chart_type: &str, params: QueryParams) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .get(
        &format!("{}/charts/{}", Self::BASE_PATH, chart_type),
        params,
        cached_for(60),
      )
      .await
  }

  /// Request an export; extra fields in `params` are merged into the body.
  pub async fn export(&self, format: ExportFormat, params: Option<Value>) -> Result<ResponseEnvelope, ApiError> {
    let mut body = json!({ "format": format.as_str() });
    if let (Some(Value::Object(extra)), Value::Object(map)) = (params, &mut body) {
      map.extend(extra);
    }
    self
      .client
      .post(
        &format!("{}/export", Self::BASE_PATH),
        Some(body),
        RequestOptions::new(),
      )
      .await
  }

  pub async fn import(&self, file: FilePart) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .upload(
        &format!("{}/import", Self::BASE_PATH),
        file,
        RequestOptions::new(),
      )
      .await
  }
}

// ============================================================================
// Files
// ============================================================================

#[derive(Clone)]
pub struct FileService {
  client: ApiClient,
}

impl FileService {
  const BASE_PATH: &'static str = "files";

  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn upload(&self, file: FilePart, folder: Option<&str>) -> Result<ResponseEnvelope, ApiError> {
    let path = match folder {
      Some(folder) => format!("{}?folder={}", Self::BASE_PATH, folder),
      None => Self::BASE_PATH.to_string(),
    };
    self.client.upload(&path, file, RequestOptions::new()).await
  }

  pub async fn list(&self, params: &PaginationParams, folder: Option<&str>) -> Result<ResponseEnvelope, ApiError> {
    let mut query = params.to_query();
    query.push_opt("folder", folder);
    self
      .client
      .get(Self::BASE_PATH, query, cached_for(60))
      .await
  }

  pub async fn delete(&self, id: &str) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .delete(&format!("{}/{}", Self::BASE_PATH, id), RequestOptions::new())
      .await
  }

  pub async fn download_url(&self, id: &str) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .get(
        &format!("{}/{}/download", Self::BASE_PATH, id),
        QueryParams::new(),
        RequestOptions::new(),
      )
      .await
  }
}

// ============================================================================
// System
// ============================================================================

#[derive(Clone)]
pub struct SystemService {
  client: ApiClient,
}

impl SystemService {
  const BASE_PATH: &'static str = "system";

  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn status(&self) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .get(
        &format!("{}/status", Self::BASE_PATH),
        QueryParams::new(),
        cached_for(10),
      )
      .await
  }

  pub async fn config(&self) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .get(
        &format!("{}/config", Self::BASE_PATH),
        QueryParams::new(),
        cached_for(5 * 60),
      )
      .await
  }

  pub async fn update_config(&self, config: Value) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .put(
        &format!("{}/config", Self::BASE_PATH),
        Some(config),
        RequestOptions::new(),
      )
      .await
  }

  pub async fn logs(&self, params: &PaginationParams, level: Option<&str>) -> Result<ResponseEnvelope, ApiError> {
    let mut query = params.to_query();
    query.push_opt("level", level);
    self
      .client
      .get(
        &format!("{}/logs", Self::BASE_PATH),
        query,
        RequestOptions::new(),
      )
      .await
  }

  /// Ask the server to clear its own cache. The local response cache is
  /// not touched.
  pub async fn clear_remote_cache(&self) -> Result<ResponseEnvelope, ApiError> {
    self
      .client
      .post(
        &format!("{}/clear-cache", Self::BASE_PATH),
        None,
        RequestOptions::new(),
      )
      .await
  }
}

/// Restore any persisted login and start the periodic cache sweep.
pub fn initialize_services(
  client: &ApiClient,
  store: Arc<dyn KeyValueStore>,
  sweep_interval: Duration,
) -> Result<(AuthService, JoinHandle<()>), StorageError> {
  let auth = AuthService::new(client.clone(), store);
  if auth.restore_session()? {
    info!("Restored persisted auth token");
  }
  let sweeper = client.spawn_cache_sweeper(sweep_interval);
  Ok((auth, sweeper))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::headers::AUTHORIZATION;
  use crate::api::testing::{json_response, ScriptedTransport};
  use crate::storage::MemoryStore;

  fn client_with(transport: Arc<ScriptedTransport>) -> ApiClient {
    ApiClient::builder("https://api.example.com")
      .transport(transport)
      .build()
  }

  #[tokio::test]
  async fn test_login_sets_and_persists_token() {
    let transport = Arc::new(ScriptedTransport::ok(json!({
      "success": true,
      "data": { "token": "abc", "user": { "id": "1" } }
    })));
    let client = client_with(transport.clone());
    let store = Arc::new(MemoryStore::new());
    let auth = AuthService::new(client.clone(), store.clone());

    let response = auth.login("a@b.c", "pw").await.unwrap();
    assert!(response.success);
    assert_eq!(client.default_headers().get(AUTHORIZATION), Some("Bearer abc"));
    assert_eq!(store.get("auth_token").unwrap().as_deref(), Some("abc"));
    assert_eq!(store.get("user_info").unwrap().as_deref(), Some(r#"{"id":"1"}"#));

    let request = &transport.requests()[0];
    assert_eq!(request.url.as_str(), "https://api.example.com/auth/login");
  }

  #[tokio::test]
  async fn test_default_base_url_keeps_api_prefix() {
    let transport = Arc::new(ScriptedTransport::ok(json!({"data": []})));
    let client = ApiClient::builder(crate::config::ApiSettings::default().base_url)
      .transport(transport.clone())
      .build();
    let users = UserService::new(client);

    users
      .get_users(&PaginationParams {
        page: Some(1),
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(
      transport.requests()[0].url.as_str(),
      "http://localhost:3000/api/users?page=1"
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_logout_clears_token_even_when_server_fails() {
    let transport = Arc::new(ScriptedTransport::always(Ok(json_response(500, json!({})))));
    let client = client_with(transport);
    client.set_auth_token("abc");
    let store = Arc::new(MemoryStore::new());
    store.set("auth_token", "abc").unwrap();
    let auth = AuthService::new(client.clone(), store.clone());

    let result = auth.logout().await;
    assert!(matches!(result, Err(ServiceError::Api(_))));
    assert!(!client.default_headers().contains(AUTHORIZATION));
    assert_eq!(store.get("auth_token").unwrap(), None);
  }

  #[tokio::test]
  async fn test_initialize_restores_token() {
    let transport = Arc::new(ScriptedTransport::ok(json!({})));
    let client = client_with(transport);
    let store = Arc::new(MemoryStore::new());
    store.set("auth_token", "persisted").unwrap();

    let (_auth, sweeper) =
      initialize_services(&client, store, Duration::from_secs(300)).unwrap();
    assert_eq!(
      client.default_headers().get(AUTHORIZATION),
      Some("Bearer persisted")
    );
    sweeper.abort();
  }

  #[tokio::test]
  async fn test_user_list_is_cached_with_pagination_query() {
    let transport = Arc::new(ScriptedTransport::ok(json!({
      "data": { "items": [], "total": 0, "page": 2, "pageSize": 10, "totalPages": 0 }
    })));
    let users = UserService::new(client_with(transport.clone()));
    let params = PaginationParams {
      page: Some(2),
      page_size: Some(10),
      sort_order: Some(SortOrder::Desc),
      ..Default::default()
    };

    let first = users.get_users(&params).await.unwrap();
    users.get_users(&params).await.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(
      transport.requests()[0].url.as_str(),
      "https://api.example.com/users?page=2&pageSize=10&sortOrder=desc"
    );
    let page: PaginatedResponse<User> = first.data_as().unwrap();
    assert_eq!(page.page, 2);
    assert!(page.items.is_empty());
  }

  #[tokio::test]
  async fn test_export_merges_params_into_body() {
    let transport = Arc::new(ScriptedTransport::ok(json!({"data": {"url": "/x.csv"}})));
    let data = DataService::new(client_with(transport.clone()));

    data
      .export(ExportFormat::Csv, Some(json!({"from": "2024-01-01"})))
      .await
      .unwrap();

    let body = transport.requests()[0].body.clone();
    assert_eq!(
      body,
      Some(crate::api::types::RequestBody::Json(
        json!({"format": "csv", "from": "2024-01-01"})
      ))
    );
  }

  #[tokio::test]
  async fn test_file_upload_into_folder() {
    let transport = Arc::new(ScriptedTransport::ok(json!({"data": {"id": "f1"}})));
    let files = FileService::new(client_with(transport.clone()));

    files
      .upload(FilePart::new("a.txt", b"hi".to_vec()), Some("docs"))
      .await
      .unwrap();
    assert_eq!(
      transport.requests()[0].url.as_str(),
      "https://api.example.com/files?folder=docs"
    );
  }
}
