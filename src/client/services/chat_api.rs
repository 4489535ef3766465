use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::client::services::http_client::{ApiError, HttpClient, RequestOptions};
use crate::common::models::{ChatMessage, ChatRoom};

/// Unreserved characters stay as-is, everything else is percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomPayload {
    pub name: String,
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload<'a> {
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct EmptyPayload {}

/// Handles are compared case-insensitively and may be typed with a leading
/// `@`; normalize before building any direct-chat path.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

fn handle_segment(handle: &str) -> String {
    utf8_percent_encode(&normalize_handle(handle), PATH_SEGMENT).to_string()
}

fn limit_query(limit: Option<usize>) -> String {
    match limit {
        Some(limit) => format!("?limit={}", limit),
        None => String::new(),
    }
}

/// Room and message endpoints of the chat service, group and direct.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_rooms(&self) -> Result<Vec<ChatRoom>, ApiError>;
    async fn create_room(&self, payload: &CreateRoomPayload) -> Result<ChatRoom, ApiError>;
    async fn get_messages(
        &self,
        room_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ApiError>;
    async fn send_message(&self, room_id: &str, content: &str) -> Result<ChatMessage, ApiError>;
    async fn start_direct_chat(&self, handle: &str) -> Result<ChatRoom, ApiError>;
    async fn get_direct_messages(
        &self,
        handle: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ApiError>;
    async fn send_direct_message(
        &self,
        handle: &str,
        content: &str,
    ) -> Result<ChatMessage, ApiError>;
}

pub struct HttpChatApi {
    http: Arc<HttpClient>,
    admin_api_key: String,
}

impl HttpChatApi {
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
impl ChatApi for HttpChatApi {
    async fn list_rooms(&self) -> Result<Vec<ChatRoom>, ApiError> {
        self.http.get("/api/chat/rooms", self.options()).await
    }

    async fn create_room(&self, payload: &CreateRoomPayload) -> Result<ChatRoom, ApiError> {
        self.http
            .post("/api/chat/rooms", payload, self.options())
            .await
    }

    async fn get_messages(
        &self,
        room_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let path = format!("/api/chat/rooms/{}/messages{}", room_id, limit_query(limit));
        self.http.get(&path, self.options()).await
    }

    async fn send_message(&self, room_id: &str, content: &str) -> Result<ChatMessage, ApiError> {
        let path = format!("/api/chat/rooms/{}/messages", room_id);
        self.http
            .post(&path, &SendMessagePayload { content }, self.options())
            .await
    }

    async fn start_direct_chat(&self, handle: &str) -> Result<ChatRoom, ApiError> {
        let path = format!("/api/chat/direct/{}", handle_segment(handle));
        self.http.post(&path, &EmptyPayload {}, self.options()).await
    }

    async fn get_direct_messages(
        &self,
        handle: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let path = format!(
            "/api/chat/direct/{}/messages{}",
            handle_segment(handle),
            limit_query(limit)
        );
        self.http.get(&path, self.options()).await
    }

    async fn send_direct_message(
        &self,
        handle: &str,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        let path = format!("/api/chat/direct/{}/messages", handle_segment(handle));
        self.http
            .post(&path, &SendMessagePayload { content }, self.options())
            .await
    }
}
