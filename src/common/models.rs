use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity record as returned by the auth service. Metadata blobs are kept
/// opaque; the client never looks inside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sign_in_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub user_types: Vec<UserType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub user_group: Option<UserGroupSummary>,
    #[serde(default)]
    pub page_roles: Vec<PageRole>,
}

/// Association between a user type and a page, carrying a free-text role
/// label. The page reference may be absent for dangling associations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRole {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub page: Option<Page>,
    #[serde(default)]
    pub user_type: Option<UserTypeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypeSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub user_group: Option<UserGroupSummary>,
}

/// A gated UI page. Only `key` participates in authorization checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub external_user_id: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub user_type: Option<UserType>,
}

/// Distinct page keys reachable through a profile's user type. Anonymous or
/// untyped profiles yield an empty set.
pub fn accessible_page_keys(profile: Option<&Profile>) -> BTreeSet<String> {
    profile
        .and_then(|p| p.user_type.as_ref())
        .map(|user_type| {
            user_type
                .page_roles
                .iter()
                .filter_map(|role| role.page.as_ref())
                .map(|page| page.key.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoomKind {
    Group,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    pub id: String,
    pub external_user_id: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub sender_user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<RoomKind>,
    #[serde(default)]
    pub direct_key: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: Vec<ChatParticipant>,
    #[serde(default)]
    pub last_message: Option<ChatMessage>,
}

impl ChatRoom {
    pub fn is_direct(&self) -> bool {
        self.kind == Some(RoomKind::Direct)
    }

    /// Most recent activity on the room: whichever of `updated_at` and the
    /// last message's creation time is later. Rooms sort by this, descending.
    pub fn activity_at(&self) -> DateTime<Utc> {
        let updated = self.updated_at.unwrap_or(self.created_at);
        match &self.last_message {
            Some(message) if message.created_at > updated => message.created_at,
            _ => updated,
        }
    }

    /// The other participant of a direct room. Falls back to the first
    /// participant when the caller's identity is unknown or not a member.
    pub fn peer_of(&self, my_external_id: Option<&str>) -> Option<&ChatParticipant> {
        if self.participants.is_empty() {
            return None;
        }
        match my_external_id {
            None => self.participants.first(),
            Some(me) => self
                .participants
                .iter()
                .find(|participant| participant.external_user_id != me)
                .or_else(|| self.participants.first()),
        }
    }

    /// Display label for a room: the peer's name or handle for direct rooms,
    /// the room name otherwise.
    pub fn display_name(&self, my_external_id: Option<&str>) -> String {
        if self.is_direct() {
            if let Some(peer) = self.peer_of(my_external_id) {
                if let Some(name) = peer.display_name.as_deref().filter(|n| !n.is_empty()) {
                    return name.to_string();
                }
                if let Some(handle) = peer.handle.as_deref().filter(|h| !h.is_empty()) {
                    return format!("@{}", handle);
                }
            }
            return "Direct chat".to_string();
        }
        if self.name.is_empty() {
            "Unnamed room".to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Sort rooms by most recent activity, newest first.
pub fn sort_rooms(rooms: &mut [ChatRoom]) {
    rooms.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
}

/// Sort messages chronologically. Realtime delivery is not ordered, so this
/// runs after every insert.
pub fn sort_messages(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

fn default_true() -> bool {
    true
}
