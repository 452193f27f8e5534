//! # Remote API Surface
//!
//! Wire DTOs and trait seams for the remote metrics service.
//!
//! ## Endpoint Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Remote API Endpoints                            │
//! │                                                                         │
//! │  Auth (camelCase bodies)                                               │
//! │    POST /auth/login          credentials  -> tokens + user             │
//! │    POST /user/register       new account  -> user                      │
//! │    POST /auth/refresh        refreshToken -> new access token          │
//! │    POST /auth/logout         deviceId     -> best-effort revoke        │
//! │                                                                        │
//! │  Metrics (bearer token, snake_case bodies)                             │
//! │    POST   /api/metrics                       create -> entryId         │
//! │    PUT    /api/metrics/{id}                  update                    │
//! │    DELETE /api/metrics/{id}                  delete                    │
//! │    GET    /api/metrics?limit&offset          paged listing             │
//! │    GET    /api/metrics/types                 catalog                   │
//! │                                                                        │
//! │  Images (bearer token, multipart)                                      │
//! │    POST   /api/images             upload  -> entryId                   │
//! │    DELETE /api/images/{id}        delete                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`AuthApi`] and [`RemoteApi`] traits are the seams the session
//! manager and sync engine are written against; tests substitute in-memory
//! implementations.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vital_core::User;

use crate::error::{AuthError, SyncError, SyncResult};
use crate::transport::AuthedClient;

// =============================================================================
// Auth DTOs (camelCase per the auth service contract)
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Shared response shape for all auth endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<UserDto>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Result of a successful token refresh. The server may or may not
/// rotate the refresh token.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

// =============================================================================
// Metric DTOs (snake_case per the metrics service contract)
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MetricUpsertRequest {
    pub metric_type_id: i64,
    pub value: f64,
    pub date: NaiveDate,
    pub is_apple_health: bool,
}

/// Body for `PUT /api/metrics/{id}`: the entry's type never changes.
#[derive(Debug, Clone, Serialize)]
pub struct MetricUpdateRequest {
    pub value: f64,
    pub date: NaiveDate,
    pub is_apple_health: bool,
}

#[derive(Debug, Deserialize)]
pub struct MetricMutationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "entryId")]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricEntryDto {
    pub id: String,
    pub metric_type_id: i64,
    pub value: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub is_apple_health: bool,
}

#[derive(Debug, Deserialize)]
pub struct MetricListResponse {
    pub entries: Vec<MetricEntryDto>,
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricTypeDto {
    pub id: i64,
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricTypesResponse {
    pub types: Vec<MetricTypeDto>,
}

/// Image upload parameters. The file is read at upload time; a missing
/// file fails the entry rather than the pass.
#[derive(Debug, Clone)]
pub struct ImageUploadRequest {
    pub file_path: String,
    pub image_type_id: i64,
    pub recorded_on: NaiveDate,
}

// =============================================================================
// Trait Seams
// =============================================================================

/// Authentication endpoints. No bearer token; these establish the session.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(
        &self,
        username: &str,
        password: &str,
        device_id: &str,
    ) -> Result<LoginOutcome, AuthError>;

    /// Creates an account; returns the created user.
    async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<User, AuthError>;

    async fn refresh(
        &self,
        refresh_token: &str,
        device_id: &str,
    ) -> Result<RefreshOutcome, AuthError>;

    /// Best-effort server-side revocation. Callers must treat failure as
    /// non-fatal: logout always succeeds locally.
    async fn logout(&self, access_token: &str, device_id: &str) -> Result<(), AuthError>;
}

/// Authenticated metrics endpoints, driven by the sync engine.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Creates a metric entry; returns the server-assigned id.
    async fn create_metric(&self, req: &MetricUpsertRequest) -> SyncResult<String>;

    async fn update_metric(&self, server_id: &str, req: &MetricUpdateRequest) -> SyncResult<()>;

    async fn delete_metric(&self, server_id: &str) -> SyncResult<()>;

    /// Uploads an image as multipart form data; returns the server id.
    async fn upload_image(&self, req: &ImageUploadRequest) -> SyncResult<String>;

    async fn delete_image(&self, server_id: &str) -> SyncResult<()>;

    /// Pages through the user's metric entries, optionally filtered by type.
    async fn list_metrics(
        &self,
        metric_type_id: Option<i64>,
        limit: u32,
        offset: u32,
    ) -> SyncResult<Vec<MetricEntryDto>>;

    /// Fetches the server's metric type catalog.
    async fn fetch_metric_types(&self) -> SyncResult<Vec<MetricTypeDto>>;
}

// =============================================================================
// HTTP Auth Implementation
// =============================================================================

/// [`AuthApi`] over plain HTTP. Uses an unauthenticated client: auth
/// endpoints never carry a bearer token.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        HttpAuthApi {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_auth<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, AuthResponse), AuthError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let parsed: AuthResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Server(format!("malformed auth response: {e}")))?;

        Ok((status, parsed))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(
        &self,
        username: &str,
        password: &str,
        device_id: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let (status, body) = self
            .post_auth(
                "/auth/login",
                &LoginRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                    device_id: device_id.to_string(),
                },
            )
            .await?;

        if status == 401 || status == 403 || (status < 500 && !body.success) {
            return Err(AuthError::InvalidCredentials);
        }
        if status >= 500 {
            return Err(AuthError::Server(
                body.message.unwrap_or_else(|| format!("status {status}")),
            ));
        }

        let user = body
            .user
            .ok_or_else(|| AuthError::Server("login response missing user".into()))?;

        Ok(LoginOutcome {
            access_token: body
                .access_token
                .ok_or_else(|| AuthError::Server("login response missing access token".into()))?,
            refresh_token: body
                .refresh_token
                .ok_or_else(|| AuthError::Server("login response missing refresh token".into()))?,
            user: User {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        })
    }

    async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<User, AuthError> {
        let (status, body) = self
            .post_auth(
                "/user/register",
                &RegisterRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                    email: email.map(str::to_string),
                },
            )
            .await?;

        if status >= 500 {
            return Err(AuthError::Server(
                body.message.unwrap_or_else(|| format!("status {status}")),
            ));
        }
        if !body.success {
            return Err(AuthError::Server(
                body.message.unwrap_or_else(|| "registration rejected".into()),
            ));
        }

        // Older server versions omit the user echo; fall back to the
        // submitted identity.
        Ok(body
            .user
            .map(|u| User {
                id: u.id,
                username: u.username,
                email: u.email,
            })
            .unwrap_or_else(|| User {
                id: String::new(),
                username: username.to_string(),
                email: email.map(str::to_string),
            }))
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        device_id: &str,
    ) -> Result<RefreshOutcome, AuthError> {
        let (status, body) = self
            .post_auth(
                "/auth/refresh",
                &RefreshRequest {
                    refresh_token: refresh_token.to_string(),
                    device_id: device_id.to_string(),
                },
            )
            .await?;

        // 401/403 on refresh means the refresh token itself is dead.
        if status == 401 || status == 403 || (status < 500 && !body.success) {
            return Err(AuthError::TokenRevoked);
        }
        if status >= 500 {
            return Err(AuthError::Server(
                body.message.unwrap_or_else(|| format!("status {status}")),
            ));
        }

        Ok(RefreshOutcome {
            access_token: body
                .access_token
                .ok_or_else(|| AuthError::Server("refresh response missing access token".into()))?,
            refresh_token: body.refresh_token,
        })
    }

    async fn logout(&self, access_token: &str, device_id: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("/auth/logout"))
            .bearer_auth(access_token)
            .json(&LogoutRequest {
                device_id: device_id.to_string(),
            })
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Server(format!(
                "logout returned status {}",
                response.status().as_u16()
            )));
        }

        Ok(())
    }
}

// =============================================================================
// HTTP Metrics Implementation
// =============================================================================

/// [`RemoteApi`] over the authenticated transport. All requests go through
/// [`AuthedClient`], which attaches the bearer token and performs the
/// single refresh-retry on 401.
#[derive(Clone)]
pub struct HttpRemoteApi {
    transport: AuthedClient,
    base_url: String,
}

impl HttpRemoteApi {
    pub fn new(transport: AuthedClient, base_url: impl Into<String>) -> Self {
        HttpRemoteApi {
            transport,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Maps a terminal response to the sync error taxonomy.
    async fn check(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        match status.as_u16() {
            // 401 surviving the transport's refresh-retry: auth is dead.
            401 => Err(SyncError::Auth(AuthError::TokenExpired)),
            404 => Err(SyncError::Conflict(message)),
            code => Err(SyncError::Server {
                status: code,
                message,
            }),
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create_metric(&self, req: &MetricUpsertRequest) -> SyncResult<String> {
        let url = self.url("/api/metrics");
        let body = req.clone();
        let response = self
            .transport
            .execute(move |c| c.post(&url).json(&body))
            .await?;

        let parsed: MetricMutationResponse = Self::check(response).await?.json().await?;
        let entry_id = parsed.entry_id.ok_or_else(|| SyncError::Server {
            status: 200,
            message: parsed
                .message
                .unwrap_or_else(|| "create response missing entryId".into()),
        })?;
        debug!(server_id = %entry_id, "Created metric entry");
        Ok(entry_id)
    }

    async fn update_metric(&self, server_id: &str, req: &MetricUpdateRequest) -> SyncResult<()> {
        let url = self.url(&format!("/api/metrics/{server_id}"));
        let body = req.clone();
        let response = self
            .transport
            .execute(move |c| c.put(&url).json(&body))
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn delete_metric(&self, server_id: &str) -> SyncResult<()> {
        let url = self.url(&format!("/api/metrics/{server_id}"));
        let response = self.transport.execute(move |c| c.delete(&url)).await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn upload_image(&self, req: &ImageUploadRequest) -> SyncResult<String> {
        // Read once up front so the retry closure can rebuild the multipart
        // body without touching the filesystem again.
        let bytes = tokio::fs::read(&req.file_path)
            .await
            .map_err(|e| SyncError::FileRead {
                path: req.file_path.clone(),
                message: e.to_string(),
            })?;

        let file_name = std::path::Path::new(&req.file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let url = self.url("/api/images");
        let image_type_id = req.image_type_id.to_string();
        let recorded_on = req.recorded_on.to_string();

        let response = self
            .transport
            .execute(move |c| {
                let form = reqwest::multipart::Form::new()
                    .part(
                        "file",
                        reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone()),
                    )
                    .text("image_type_id", image_type_id.clone())
                    .text("date", recorded_on.clone());
                c.post(&url).multipart(form)
            })
            .await?;

        let parsed: MetricMutationResponse = Self::check(response).await?.json().await?;
        let entry_id = parsed.entry_id.ok_or_else(|| SyncError::Server {
            status: 200,
            message: parsed
                .message
                .unwrap_or_else(|| "upload response missing entryId".into()),
        })?;
        debug!(server_id = %entry_id, "Uploaded image entry");
        Ok(entry_id)
    }

    async fn delete_image(&self, server_id: &str) -> SyncResult<()> {
        let url = self.url(&format!("/api/images/{server_id}"));
        let response = self.transport.execute(move |c| c.delete(&url)).await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn list_metrics(
        &self,
        metric_type_id: Option<i64>,
        limit: u32,
        offset: u32,
    ) -> SyncResult<Vec<MetricEntryDto>> {
        let mut url = self.url(&format!("/api/metrics?limit={limit}&offset={offset}"));
        if let Some(type_id) = metric_type_id {
            url.push_str(&format!("&metric_type_id={type_id}"));
        }
        let response = self.transport.execute(move |c| c.get(&url)).await?;

        let parsed: MetricListResponse = Self::check(response).await?.json().await?;
        Ok(parsed.entries)
    }

    async fn fetch_metric_types(&self) -> SyncResult<Vec<MetricTypeDto>> {
        let url = self.url("/api/metrics/types");
        let response = self.transport.execute(move |c| c.get(&url)).await?;

        let parsed: MetricTypesResponse = Self::check(response).await?.json().await?;
        Ok(parsed.types)
    }
}

// =============================================================================
// Tests
// =============================================================================
