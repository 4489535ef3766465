use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::services::http_client::{ApiError, HttpClient, RequestOptions};
use crate::common::models::{AuthUser, Profile};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub token_type: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: AuthUser,
    #[serde(default)]
    pub profile: Option<Profile>,
}

/// Credential endpoints of the auth service. Both calls are anonymous: the
/// bearer token only exists after a successful login.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, payload: &LoginPayload) -> Result<AuthResponse, ApiError>;
    async fn register(&self, payload: &RegisterPayload) -> Result<RegisterResponse, ApiError>;
}

pub struct HttpAuthApi {
    http: Arc<HttpClient>,
}

impl HttpAuthApi {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, payload: &LoginPayload) -> Result<AuthResponse, ApiError> {
        self.http
            .post("/auth/login", payload, RequestOptions::anonymous())
            .await
    }

    async fn register(&self, payload: &RegisterPayload) -> Result<RegisterResponse, ApiError> {
        self.http
            .post("/auth/register", payload, RequestOptions::anonymous())
            .await
    }
}
