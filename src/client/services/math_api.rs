use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::services::http_client::{ApiError, HttpClient, RequestOptions};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MathPayload {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathResponse {
    pub result: f64,
    pub log_id: String,
    pub user_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Sample protected endpoint: the call only succeeds with a valid bearer
/// token, which makes it a convenient session probe.
pub struct MathApi {
    http: Arc<HttpClient>,
}

impl MathApi {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn add(&self, a: f64, b: f64) -> Result<MathResponse, ApiError> {
        self.http
            .post(
                "/api/math/add",
                &MathPayload { a, b },
                RequestOptions::authenticated(),
            )
            .await
    }
}
