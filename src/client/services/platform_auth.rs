use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use crate::common::models::AuthUser;

/// Session as reported by the identity platform. The access token here may
/// differ from the one persisted locally (e.g. after an OAuth redirect).
#[derive(Debug, Clone)]
pub struct PlatformSession {
    pub access_token: String,
    pub user: AuthUser,
}

/// Thin client for the third-party identity platform: session probing, OAuth
/// entry point and sign-out. The realtime transport lives elsewhere.
#[async_trait]
pub trait IdentityPlatform: Send + Sync {
    /// The platform's current session, if it holds one.
    async fn current_session(&self) -> anyhow::Result<Option<PlatformSession>>;

    /// URL the shell must open to start an OAuth login with `provider`.
    fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> anyhow::Result<String>;

    /// Invalidates `access_token` on the platform side.
    async fn sign_out(&self, access_token: &str) -> anyhow::Result<()>;
}

// The platform speaks snake_case, unlike our own REST services.
#[derive(Debug, Deserialize)]
struct PlatformUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: Option<serde_json::Value>,
    #[serde(default)]
    user_metadata: Option<serde_json::Value>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    last_sign_in_at: Option<String>,
}

impl From<PlatformUser> for AuthUser {
    fn from(user: PlatformUser) -> Self {
        AuthUser {
            id: user.id,
            email: user.email,
            app_metadata: user.app_metadata,
            user_metadata: user.user_metadata,
            created_at: user.created_at,
            last_sign_in_at: user.last_sign_in_at,
        }
    }
}

pub struct PlatformAuthClient {
    base_url: String,
    anon_key: String,
    http: reqwest::Client,
    /// Token handed to us out-of-band (OAuth redirect fragment). The platform
    /// has no session until the shell stores one here.
    access_token: Mutex<Option<String>>,
}

impl PlatformAuthClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            http: reqwest::Client::new(),
            access_token: Mutex::new(None),
        }
    }

    /// Installs the access token obtained from an OAuth redirect.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.lock().unwrap() = Some(token.into());
    }

    fn current_token(&self) -> Option<String> {
        self.access_token.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityPlatform for PlatformAuthClient {
    async fn current_session(&self) -> anyhow::Result<Option<PlatformSession>> {
        let Some(token) = self.current_token() else {
            return Ok(None);
        };

        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Token expired or revoked: the platform no longer has a session.
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let user: PlatformUser = response.json().await?;
        Ok(Some(PlatformSession {
            access_token: token,
            user: user.into(),
        }))
    }

    fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> anyhow::Result<String> {
        let mut url = url::Url::parse(&format!("{}/auth/v1/authorize", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(url.to_string())
    }

    async fn sign_out(&self, access_token: &str) -> anyhow::Result<()> {
        let url = format!("{}/auth/v1/logout", self.base_url);
        self.http
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?;
        *self.access_token.lock().unwrap() = None;
        Ok(())
    }
}
