use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::client::services::http_client::{ApiError, HttpClient, RequestOptions};
use crate::common::models::{Page, PageRole, Profile, UserGroup, UserType};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserGroupPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserTypePayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// `null` detaches the type from any group, so it always serializes.
    pub user_group_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePagePayload {
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageRolePayload {
    pub user_type_id: String,
    pub page_id: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileUserTypePayload {
    /// `null` clears the assignment, so it always serializes.
    pub user_type_id: Option<String>,
}

/// Admin REST surface for the access-control entities. Every call is
/// authorized and carries the static admin key header.
#[async_trait]
pub trait AccessControlApi: Send + Sync {
    async fn list_profiles(&self) -> Result<Vec<Profile>, ApiError>;
    async fn get_profile(&self, external_user_id: &str) -> Result<Profile, ApiError>;
    async fn update_profile_user_type(
        &self,
        external_user_id: &str,
        payload: &UpdateProfileUserTypePayload,
    ) -> Result<Profile, ApiError>;

    async fn list_user_groups(&self) -> Result<Vec<UserGroup>, ApiError>;
    async fn create_user_group(
        &self,
        payload: &CreateUserGroupPayload,
    ) -> Result<UserGroup, ApiError>;

    async fn list_user_types(&self) -> Result<Vec<UserType>, ApiError>;
    async fn create_user_type(&self, payload: &CreateUserTypePayload)
        -> Result<UserType, ApiError>;

    async fn list_pages(&self) -> Result<Vec<Page>, ApiError>;
    async fn create_page(&self, payload: &CreatePagePayload) -> Result<Page, ApiError>;

    async fn list_page_roles(&self) -> Result<Vec<PageRole>, ApiError>;
    async fn create_page_role(&self, payload: &CreatePageRolePayload)
        -> Result<PageRole, ApiError>;
    async fn delete_page_role(&self, id: &str) -> Result<PageRole, ApiError>;
}

pub struct HttpAccessControlApi {
    http: Arc<HttpClient>,
    admin_api_key: String,
}

impl HttpAccessControlApi {
    pub fn new(http: Arc<HttpClient>, admin_api_key: impl Into<String>) -> Self {
        Self {
            http,
            admin_api_key: admin_api_key.into(),
        }
    }

    fn options(&self) -> RequestOptions {
        RequestOptions::authenticated().with_header("x-admin-key", &self.admin_api_key)
    }
}

#[async_trait]
impl AccessControlApi for HttpAccessControlApi {
    async fn list_profiles(&self) -> Result<Vec<Profile>, ApiError> {
        self.http.get("/auth/profiles", self.options()).await
    }

    async fn get_profile(&self, external_user_id: &str) -> Result<Profile, ApiError> {
        let path = format!("/auth/profiles/{}", external_user_id);
        self.http.get(&path, self.options()).await
    }

    async fn update_profile_user_type(
        &self,
        external_user_id: &str,
        payload: &UpdateProfileUserTypePayload,
    ) -> Result<Profile, ApiError> {
        let path = format!("/auth/profiles/{}/user-type", external_user_id);
        self.http.patch(&path, payload, self.options()).await
    }

    async fn list_user_groups(&self) -> Result<Vec<UserGroup>, ApiError> {
        self.http.get("/auth/user-groups", self.options()).await
    }

    async fn create_user_group(
        &self,
        payload: &CreateUserGroupPayload,
    ) -> Result<UserGroup, ApiError> {
        self.http
            .post("/auth/user-groups", payload, self.options())
            .await
    }

    async fn list_user_types(&self) -> Result<Vec<UserType>, ApiError> {
        self.http.get("/auth/user-types", self.options()).await
    }

    async fn create_user_type(
        &self,
        payload: &CreateUserTypePayload,
    ) -> Result<UserType, ApiError> {
        self.http
            .post("/auth/user-types", payload, self.options())
            .await
    }

    async fn list_pages(&self) -> Result<Vec<Page>, ApiError> {
        self.http.get("/auth/pages", self.options()).await
    }

    async fn create_page(&self, payload: &CreatePagePayload) -> Result<Page, ApiError> {
        self.http.post("/auth/pages", payload, self.options()).await
    }

    async fn list_page_roles(&self) -> Result<Vec<PageRole>, ApiError> {
        self.http
            .get("/auth/user-type-page-roles", self.options())
            .await
    }

    async fn create_page_role(
        &self,
        payload: &CreatePageRolePayload,
    ) -> Result<PageRole, ApiError> {
        self.http
            .post("/auth/user-type-page-roles", payload, self.options())
            .await
    }

    async fn delete_page_role(&self, id: &str) -> Result<PageRole, ApiError> {
        let path = format!("/auth/user-type-page-roles/{}", id);
        self.http.delete(&path, self.options()).await
    }
}
