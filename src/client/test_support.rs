//! In-memory fakes shared by the controller and service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::mpsc;

use crate::client::services::access_control_api::{
    AccessControlApi, CreatePagePayload, CreatePageRolePayload, CreateUserGroupPayload,
    CreateUserTypePayload, UpdateProfileUserTypePayload,
};
use crate::client::services::auth_api::{
    AuthApi, AuthResponse, LoginPayload, RegisterPayload, RegisterResponse,
};
use crate::client::services::chat_api::{normalize_handle, ChatApi, CreateRoomPayload};
use crate::client::services::http_client::ApiError;
use crate::client::services::platform_auth::{IdentityPlatform, PlatformSession};
use crate::client::services::realtime::{RealtimeConnector, RealtimeEnvelope, RealtimeSubscription};
use crate::common::models::{
    AuthUser, ChatMessage, ChatParticipant, ChatRoom, Page, PageRole, Profile, RoomKind, UserGroup,
    UserType,
};

pub(crate) fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub(crate) fn status_err(status: u16, message: &str) -> ApiError {
    ApiError::Status {
        status,
        payload: Some(json!({ "message": message })),
    }
}

pub(crate) fn sample_user(id: &str) -> AuthUser {
    AuthUser {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        app_metadata: None,
        user_metadata: None,
        created_at: None,
        last_sign_in_at: None,
    }
}

pub(crate) fn sample_profile(external_user_id: &str, page_keys: &[&str]) -> Profile {
    let page_roles = page_keys
        .iter()
        .enumerate()
        .map(|(i, key)| PageRole {
            id: format!("role-{}-{}", external_user_id, i),
            role: "member".to_string(),
            page: Some(Page {
                id: format!("page-{}", key),
                key: key.to_string(),
                name: key.to_string(),
                path: None,
                description: None,
                is_active: true,
            }),
            user_type: None,
        })
        .collect();

    Profile {
        id: format!("profile-{}", external_user_id),
        external_user_id: external_user_id.to_string(),
        handle: Some(external_user_id.to_string()),
        display_name: Some(format!("User {}", external_user_id)),
        avatar_url: None,
        user_type: Some(UserType {
            id: format!("type-{}", external_user_id),
            name: "member".to_string(),
            description: None,
            is_active: true,
            user_group: None,
            page_roles,
        }),
    }
}

pub(crate) fn participant(external_user_id: &str, handle: &str) -> ChatParticipant {
    ChatParticipant {
        id: format!("cp-{}", external_user_id),
        external_user_id: external_user_id.to_string(),
        handle: Some(handle.to_string()),
        display_name: Some(format!("User {}", external_user_id)),
        joined_at: None,
    }
}

pub(crate) fn sample_room(id: &str, created_secs: i64) -> ChatRoom {
    ChatRoom {
        id: id.to_string(),
        name: format!("room {}", id),
        kind: Some(RoomKind::Group),
        direct_key: None,
        created_at: ts(created_secs),
        updated_at: None,
        participants: Vec::new(),
        last_message: None,
    }
}

pub(crate) fn sample_direct_room(
    id: &str,
    created_secs: i64,
    me: &str,
    peer_handle: &str,
) -> ChatRoom {
    ChatRoom {
        id: id.to_string(),
        name: String::new(),
        kind: Some(RoomKind::Direct),
        direct_key: Some(normalize_handle(peer_handle)),
        created_at: ts(created_secs),
        updated_at: None,
        participants: vec![participant(me, me), participant(peer_handle, peer_handle)],
        last_message: None,
    }
}

pub(crate) fn sample_message(id: &str, room_id: &str, sender: &str, secs: i64) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        room_id: room_id.to_string(),
        sender_user_id: sender.to_string(),
        content: format!("message {}", id),
        created_at: ts(secs),
    }
}

#[derive(Default)]
pub(crate) struct FakeAuthApi {
    accepted: Mutex<Option<(String, AuthUser, Option<Profile>)>>,
    rejection: Mutex<Option<(u16, String)>>,
}

impl FakeAuthApi {
    pub fn accept(&self, token: &str, user: AuthUser, profile: Option<Profile>) {
        *self.accepted.lock().unwrap() = Some((token.to_string(), user, profile));
    }

    pub fn reject(&self, status: u16, message: &str) {
        *self.rejection.lock().unwrap() = Some((status, message.to_string()));
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, _payload: &LoginPayload) -> Result<AuthResponse, ApiError> {
        if let Some((status, message)) = self.rejection.lock().unwrap().clone() {
            return Err(status_err(status, &message));
        }
        let Some((token, user, profile)) = self.accepted.lock().unwrap().clone() else {
            return Err(status_err(500, "no login behavior configured"));
        };
        Ok(AuthResponse {
            token_type: Some("bearer".to_string()),
            access_token: token,
            refresh_token: None,
            expires_in: None,
            user,
            profile,
        })
    }

    async fn register(&self, payload: &RegisterPayload) -> Result<RegisterResponse, ApiError> {
        if let Some((status, message)) = self.rejection.lock().unwrap().clone() {
            return Err(status_err(status, &message));
        }
        Ok(RegisterResponse {
            message: Some("registered".to_string()),
            user: sample_user(&payload.email),
            profile: None,
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeAccessControlApi {
    pub profiles: Mutex<Vec<Profile>>,
    pub groups: Mutex<Vec<UserGroup>>,
    pub user_types: Mutex<Vec<UserType>>,
    pub pages: Mutex<Vec<Page>>,
    pub page_roles: Mutex<Vec<PageRole>>,
    calls: Mutex<Vec<String>>,
    fail_next: Mutex<Option<(u16, String)>>,
    counter: AtomicUsize,
}

impl FakeAccessControlApi {
    pub fn fail_next(&self, status: u16, message: &str) {
        *self.fail_next.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, name: &str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(name.to_string());
        if let Some((status, message)) = self.fail_next.lock().unwrap().take() {
            return Err(status_err(status, &message));
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl AccessControlApi for FakeAccessControlApi {
    async fn list_profiles(&self) -> Result<Vec<Profile>, ApiError> {
        self.record("list_profiles")?;
        Ok(self.profiles.lock().unwrap().clone())
    }

    async fn get_profile(&self, external_user_id: &str) -> Result<Profile, ApiError> {
        self.record("get_profile")?;
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.external_user_id == external_user_id)
            .cloned()
            .ok_or_else(|| status_err(404, "profile not found"))
    }

    async fn update_profile_user_type(
        &self,
        external_user_id: &str,
        payload: &UpdateProfileUserTypePayload,
    ) -> Result<Profile, ApiError> {
        self.record("update_profile_user_type")?;
        let user_type = payload.user_type_id.as_ref().and_then(|id| {
            self.user_types
                .lock()
                .unwrap()
                .iter()
                .find(|t| &t.id == id)
                .cloned()
        });
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .iter_mut()
            .find(|p| p.external_user_id == external_user_id)
            .ok_or_else(|| status_err(404, "profile not found"))?;
        profile.user_type = user_type;
        Ok(profile.clone())
    }

    async fn list_user_groups(&self) -> Result<Vec<UserGroup>, ApiError> {
        self.record("list_user_groups")?;
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn create_user_group(
        &self,
        payload: &CreateUserGroupPayload,
    ) -> Result<UserGroup, ApiError> {
        self.record("create_user_group")?;
        let group = UserGroup {
            id: self.next_id("group"),
            name: payload.name.clone(),
            description: payload.description.clone(),
            is_active: payload.is_active.unwrap_or(true),
            user_types: Vec::new(),
        };
        self.groups.lock().unwrap().push(group.clone());
        Ok(group)
    }

    async fn list_user_types(&self) -> Result<Vec<UserType>, ApiError> {
        self.record("list_user_types")?;
        Ok(self.user_types.lock().unwrap().clone())
    }

    async fn create_user_type(
        &self,
        payload: &CreateUserTypePayload,
    ) -> Result<UserType, ApiError> {
        self.record("create_user_type")?;
        let user_type = UserType {
            id: self.next_id("type"),
            name: payload.name.clone(),
            description: payload.description.clone(),
            is_active: payload.is_active.unwrap_or(true),
            user_group: None,
            page_roles: Vec::new(),
        };
        self.user_types.lock().unwrap().push(user_type.clone());
        Ok(user_type)
    }

    async fn list_pages(&self) -> Result<Vec<Page>, ApiError> {
        self.record("list_pages")?;
        Ok(self.pages.lock().unwrap().clone())
    }

    async fn create_page(&self, payload: &CreatePagePayload) -> Result<Page, ApiError> {
        self.record("create_page")?;
        let page = Page {
            id: self.next_id("page"),
            key: payload.key.clone(),
            name: payload.name.clone(),
            path: payload.path.clone(),
            description: payload.description.clone(),
            is_active: payload.is_active.unwrap_or(true),
        };
        self.pages.lock().unwrap().push(page.clone());
        Ok(page)
    }

    async fn list_page_roles(&self) -> Result<Vec<PageRole>, ApiError> {
        self.record("list_page_roles")?;
        Ok(self.page_roles.lock().unwrap().clone())
    }

    async fn create_page_role(
        &self,
        payload: &CreatePageRolePayload,
    ) -> Result<PageRole, ApiError> {
        self.record("create_page_role")?;
        let role = PageRole {
            id: self.next_id("role"),
            role: payload.role.clone(),
            page: self
                .pages
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == payload.page_id)
                .cloned(),
            user_type: None,
        };
        self.page_roles.lock().unwrap().push(role.clone());
        Ok(role)
    }

    async fn delete_page_role(&self, id: &str) -> Result<PageRole, ApiError> {
        self.record("delete_page_role")?;
        let mut roles = self.page_roles.lock().unwrap();
        let index = roles
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| status_err(404, "role not found"))?;
        Ok(roles.remove(index))
    }
}

#[derive(Default)]
pub(crate) struct FakeIdentityPlatform {
    pub session: Mutex<Option<PlatformSession>>,
    sign_out_calls: AtomicUsize,
    sign_out_fails: AtomicBool,
}

impl FakeIdentityPlatform {
    pub fn fail_sign_out(&self) {
        self.sign_out_fails.store(true, Ordering::SeqCst);
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityPlatform for FakeIdentityPlatform {
    async fn current_session(&self) -> anyhow::Result<Option<PlatformSession>> {
        Ok(self.session.lock().unwrap().clone())
    }

    fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> anyhow::Result<String> {
        Ok(format!(
            "https://platform.test/authorize?provider={}&redirect_to={}",
            provider, redirect_to
        ))
    }

    async fn sign_out(&self, _access_token: &str) -> anyhow::Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.sign_out_fails.load(Ordering::SeqCst) {
            anyhow::bail!("platform unreachable");
        }
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeChatApi {
    pub rooms: Mutex<Vec<ChatRoom>>,
    pub messages: Mutex<HashMap<String, Vec<ChatMessage>>>,
    pub direct_messages: Mutex<HashMap<String, Vec<ChatMessage>>>,
    calls: Mutex<Vec<String>>,
    counter: AtomicUsize,
}

impl FakeChatApi {
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn echo(&self, room_id: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: format!("srv-{}", self.counter.fetch_add(1, Ordering::SeqCst)),
            room_id: room_id.to_string(),
            sender_user_id: "me".to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn list_rooms(&self) -> Result<Vec<ChatRoom>, ApiError> {
        self.record("list_rooms".to_string());
        Ok(self.rooms.lock().unwrap().clone())
    }

    async fn create_room(&self, payload: &CreateRoomPayload) -> Result<ChatRoom, ApiError> {
        self.record("create_room".to_string());
        let room = ChatRoom {
            id: format!("room-{}", self.counter.fetch_add(1, Ordering::SeqCst)),
            name: payload.name.clone(),
            kind: Some(RoomKind::Group),
            direct_key: None,
            created_at: Utc::now(),
            updated_at: None,
            participants: Vec::new(),
            last_message: None,
        };
        self.rooms.lock().unwrap().push(room.clone());
        Ok(room)
    }

    async fn get_messages(
        &self,
        room_id: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        self.record(format!("get_messages:{}", room_id));
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, room_id: &str, content: &str) -> Result<ChatMessage, ApiError> {
        self.record(format!("send_message:{}", room_id));
        let message = self.echo(room_id, content);
        self.messages
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn start_direct_chat(&self, handle: &str) -> Result<ChatRoom, ApiError> {
        let handle = normalize_handle(handle);
        self.record(format!("start_direct_chat:{}", handle));
        let existing = self
            .rooms
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.direct_key.as_deref() == Some(handle.as_str()))
            .cloned();
        if let Some(room) = existing {
            return Ok(room);
        }
        let room = sample_direct_room(&format!("direct-{}", handle), 0, "me", &handle);
        self.rooms.lock().unwrap().push(room.clone());
        Ok(room)
    }

    async fn get_direct_messages(
        &self,
        handle: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let handle = normalize_handle(handle);
        self.record(format!("get_direct_messages:{}", handle));
        Ok(self
            .direct_messages
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_direct_message(
        &self,
        handle: &str,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        let handle = normalize_handle(handle);
        self.record(format!("send_direct_message:{}", handle));
        let room_id = self
            .rooms
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.direct_key.as_deref() == Some(handle.as_str()))
            .map(|r| r.id.clone())
            .unwrap_or_else(|| format!("direct-{}", handle));
        let message = self.echo(&room_id, content);
        self.direct_messages
            .lock()
            .unwrap()
            .entry(handle)
            .or_default()
            .push(message.clone());
        Ok(message)
    }
}

/// Connector whose subscriptions are plain channels; tests push envelopes in
/// through `emit`.
#[derive(Default)]
pub(crate) struct FakeRealtimeConnector {
    topics: Mutex<Vec<String>>,
    senders: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<RealtimeEnvelope>>>>,
}

impl FakeRealtimeConnector {
    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == topic)
            .count()
    }

    /// Fans the envelope out to every live subscription of the topic, the way
    /// a broadcast channel would.
    pub fn emit(&self, topic: &str, envelope: RealtimeEnvelope) {
        if let Some(senders) = self.senders.lock().unwrap().get(topic) {
            for sender in senders {
                let _ = sender.send(envelope.clone());
            }
        }
    }

    pub fn emit_chat_message(&self, room_id: &str, message: &ChatMessage) {
        self.emit(
            &format!("chat.room.{}", room_id),
            RealtimeEnvelope {
                event: "chat.message".to_string(),
                payload: serde_json::to_value(message).unwrap(),
                timestamp: Some(message.created_at),
            },
        );
    }
}

#[async_trait]
impl RealtimeConnector for FakeRealtimeConnector {
    async fn subscribe(&self, topic: &str) -> anyhow::Result<RealtimeSubscription> {
        self.topics.lock().unwrap().push(topic.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(RealtimeSubscription::new(topic, rx))
    }
}
