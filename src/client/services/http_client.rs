use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Where the HTTP client reads the current bearer token from. The session
/// store implements this so the token attached to a request is always the
/// persisted one, never a stale copy.
pub trait BearerTokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// No token, ever. Useful for clients of unauthenticated services.
pub struct AnonymousTokens;

impl BearerTokenSource for AnonymousTokens {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response. The payload is the parsed JSON body when the server
    /// sent one, so callers can branch on status and message.
    #[error("request failed with status {status}")]
    Status {
        status: u16,
        payload: Option<serde_json::Value>,
    },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server-provided `message` field, when the error carries one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status {
                payload: Some(payload),
                ..
            } => payload.get("message").and_then(|m| m.as_str()),
            _ => None,
        }
    }

    /// Single human-readable string for rendering: the server message when
    /// present, the given fallback otherwise. Internal structure never leaks
    /// to the view.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }
}

#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    /// Overrides the client-level authentication default for this call.
    pub auth: Option<bool>,
    /// Extra static headers (e.g. the admin key).
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn authenticated() -> Self {
        Self {
            auth: Some(true),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self {
            auth: Some(false),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Thin JSON client over one REST base URL. Attaches a bearer token when the
/// call (or the client default) asks for one.
pub struct HttpClient {
    base_url: String,
    authenticate_by_default: bool,
    tokens: Arc<dyn BearerTokenSource>,
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(
        base_url: impl Into<String>,
        authenticate_by_default: bool,
        tokens: Arc<dyn BearerTokenSource>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authenticate_by_default,
            tokens,
            inner: reqwest::Client::new(),
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, None, options).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body), options).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, path, Some(body), options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None, options).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .inner
            .request(method, &url)
            .header(ACCEPT, "application/json");

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if options.auth.unwrap_or(self.authenticate_by_default) {
            if let Some(token) = self.tokens.bearer_token() {
                builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
            }
        }

        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let payload = serde_json::from_str(&text).ok();
            return Err(ApiError::Status {
                status: status.as_u16(),
                payload,
            });
        }

        // Empty bodies decode as JSON null so unit/Option responses work.
        if text.is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_message_is_surfaced_verbatim() {
        let err = ApiError::Status {
            status: 409,
            payload: Some(json!({ "message": "group already exists" })),
        };
        assert_eq!(err.server_message(), Some("group already exists"));
        assert_eq!(err.user_message("fallback"), "group already exists");
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn missing_or_unstructured_payload_falls_back() {
        let bare = ApiError::Status {
            status: 502,
            payload: None,
        };
        assert_eq!(bare.user_message("something went wrong"), "something went wrong");

        let unstructured = ApiError::Status {
            status: 500,
            payload: Some(json!(["not", "an", "object"])),
        };
        assert_eq!(unstructured.server_message(), None);
    }
}
