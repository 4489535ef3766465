use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::client::controllers::notifications::NotificationManager;
use crate::client::services::auth_manager::AuthSessionManager;
use crate::client::services::chat_api::ChatApi;
use crate::client::services::realtime::RealtimeConnector;
use crate::common::models::{sort_messages, sort_rooms, ChatMessage, ChatRoom};

pub const CHAT_PAGE_KEY: &str = "dashboard.chat";
pub const MESSAGE_PAGE_SIZE: usize = 100;

const LOAD_ROOMS_ERROR: &str = "Could not load the rooms.";
const LOAD_MESSAGES_ERROR: &str = "Could not load the messages.";
const SEND_ERROR: &str = "Could not send the message.";
const DIRECT_START_ERROR: &str = "Could not start the direct chat.";
const MISSING_HANDLE_ERROR: &str = "Enter a destination handle.";

#[derive(Debug, Clone, Default)]
pub struct ChatPageState {
    pub allowed: bool,
    pub rooms: Vec<ChatRoom>,
    pub selected_room_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub is_loading_rooms: bool,
    pub is_loading_messages: bool,
    pub is_sending: bool,
    pub is_starting_direct: bool,
    pub feedback: Option<String>,
    pub error: Option<String>,
    load_generation: u64,
}

struct RoomChannel {
    room_id: String,
    task: JoinHandle<()>,
}

/// Drives the chat screen: room list, per-room message history, composer and
/// the realtime subscription of the currently viewed room. Background
/// notification subscriptions stay with the [`NotificationManager`]; this
/// controller owns exactly one channel, for the room on screen.
pub struct ChatPageController {
    chat: Arc<dyn ChatApi>,
    auth: Arc<AuthSessionManager>,
    notifications: Arc<NotificationManager>,
    realtime: Arc<dyn RealtimeConnector>,
    state: Mutex<ChatPageState>,
    room_channel: tokio::sync::Mutex<Option<RoomChannel>>,
}

impl ChatPageController {
    pub fn new(
        chat: Arc<dyn ChatApi>,
        auth: Arc<AuthSessionManager>,
        notifications: Arc<NotificationManager>,
        realtime: Arc<dyn RealtimeConnector>,
    ) -> Self {
        Self {
            chat,
            auth,
            notifications,
            realtime,
            state: Mutex::new(ChatPageState::default()),
            room_channel: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChatPageState {
        self.state.lock().unwrap().clone()
    }

    fn my_external_id(&self) -> Option<String> {
        self.auth.snapshot().external_user_id()
    }

    /// Lists rooms, picks the initial selection (query parameter beats the
    /// previous selection, which beats the most recent room) and hands every
    /// room to the notification manager for background subscription.
    pub async fn mount(self: &Arc<Self>, query_room: Option<&str>) {
        let allowed = self.auth.can_access_page(CHAT_PAGE_KEY);
        {
            let mut state = self.state.lock().unwrap();
            state.allowed = allowed;
            if !allowed {
                state.is_loading_rooms = false;
                return;
            }
            state.is_loading_rooms = true;
        }

        match self.chat.list_rooms().await {
            Ok(mut rooms) => {
                sort_rooms(&mut rooms);
                let selected = {
                    let mut state = self.state.lock().unwrap();
                    let query_match = query_room
                        .filter(|id| rooms.iter().any(|room| room.id == **id))
                        .map(|id| id.to_string());
                    let current = state
                        .selected_room_id
                        .clone()
                        .filter(|id| rooms.iter().any(|room| &room.id == id));
                    let next = query_match
                        .or(current)
                        .or_else(|| rooms.first().map(|room| room.id.clone()));
                    state.rooms = rooms.clone();
                    state.is_loading_rooms = false;
                    next
                };

                for room in &rooms {
                    self.notifications.subscribe_room(room).await;
                }
                if let Some(room_id) = selected {
                    self.select_room(&room_id).await;
                }
            }
            Err(e) => {
                let mut state = self.state.lock().unwrap();
                state.error = Some(e.user_message(LOAD_ROOMS_ERROR));
                state.is_loading_rooms = false;
            }
        }
    }

    /// Switches the viewed room: loads its history and swaps the inline
    /// realtime channel. Direct rooms read history through the direct
    /// endpoint, addressed by the peer handle taken from the participant
    /// list.
    pub async fn select_room(self: &Arc<Self>, room_id: &str) {
        let generation = {
            let mut state = self.state.lock().unwrap();
            state.selected_room_id = Some(room_id.to_string());
            state.is_loading_messages = true;
            state.load_generation += 1;
            state.load_generation
        };

        let room = {
            let state = self.state.lock().unwrap();
            state.rooms.iter().find(|r| r.id == room_id).cloned()
        };

        let result = match &room {
            Some(room) if room.is_direct() => {
                let me = self.my_external_id();
                match room
                    .peer_of(me.as_deref())
                    .and_then(|peer| peer.handle.clone())
                {
                    Some(handle) => {
                        self.chat
                            .get_direct_messages(&handle, Some(MESSAGE_PAGE_SIZE))
                            .await
                    }
                    // Peer without a handle: fall back to the room endpoint.
                    None => self.chat.get_messages(room_id, Some(MESSAGE_PAGE_SIZE)).await,
                }
            }
            _ => self.chat.get_messages(room_id, Some(MESSAGE_PAGE_SIZE)).await,
        };

        {
            let mut state = self.state.lock().unwrap();
            // A newer selection superseded this load; drop the result.
            if state.load_generation == generation {
                match result {
                    Ok(mut messages) => {
                        sort_messages(&mut messages);
                        state.messages = messages;
                    }
                    Err(e) => state.error = Some(e.user_message(LOAD_MESSAGES_ERROR)),
                }
                state.is_loading_messages = false;
            }
        }

        self.attach_room_channel(room_id).await;
    }

    /// Idempotent insert by message id, followed by a re-sort of both the
    /// message list and the room list. Absorbs the double delivery of a sent
    /// message (REST response plus realtime echo).
    pub fn append_message(&self, incoming: ChatMessage) {
        let mut state = self.state.lock().unwrap();

        if state.selected_room_id.as_deref() == Some(incoming.room_id.as_str())
            && !state.messages.iter().any(|m| m.id == incoming.id)
        {
            state.messages.push(incoming.clone());
            sort_messages(&mut state.messages);
        }

        if let Some(room) = state.rooms.iter_mut().find(|r| r.id == incoming.room_id) {
            room.updated_at = Some(incoming.created_at);
            room.last_message = Some(incoming);
        }
        sort_rooms(&mut state.rooms);
    }

    /// Sends the composer content to the selected room. Guarded against
    /// concurrent sends and empty content; the returned message is appended
    /// immediately instead of waiting for the realtime echo.
    pub async fn send_message(&self, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }

        let room = {
            let mut state = self.state.lock().unwrap();
            if state.is_sending {
                return;
            }
            let Some(room) = state
                .selected_room_id
                .as_ref()
                .and_then(|id| state.rooms.iter().find(|r| &r.id == id))
                .cloned()
            else {
                return;
            };
            state.is_sending = true;
            state.error = None;
            room
        };

        let result = if room.is_direct() {
            let me = self.my_external_id();
            match room
                .peer_of(me.as_deref())
                .and_then(|peer| peer.handle.clone())
            {
                Some(handle) => self.chat.send_direct_message(&handle, content).await,
                None => self.chat.send_message(&room.id, content).await,
            }
        } else {
            self.chat.send_message(&room.id, content).await
        };

        match result {
            Ok(sent) => self.append_message(sent),
            Err(e) => {
                self.state.lock().unwrap().error = Some(e.user_message(SEND_ERROR));
            }
        }
        self.state.lock().unwrap().is_sending = false;
    }

    /// Creates (or reuses) the direct room for `handle`, subscribes it and
    /// selects it.
    pub async fn start_direct_chat(self: &Arc<Self>, handle_input: &str) {
        {
            let mut state = self.state.lock().unwrap();
            state.feedback = None;
            let target = handle_input.trim();
            if target.is_empty() {
                state.error = Some(MISSING_HANDLE_ERROR.to_string());
                return;
            }
            state.error = None;
            state.is_starting_direct = true;
        }

        match self.chat.start_direct_chat(handle_input.trim()).await {
            Ok(room) => {
                self.upsert_room(room.clone());
                self.notifications.subscribe_room(&room).await;
                let name = room.display_name(self.my_external_id().as_deref());
                self.state.lock().unwrap().feedback =
                    Some(format!("Direct chat ready with {}.", name));
                self.select_room(&room.id).await;
            }
            Err(e) => {
                self.state.lock().unwrap().error = Some(e.user_message(DIRECT_START_ERROR));
            }
        }
        self.state.lock().unwrap().is_starting_direct = false;
    }

    /// Drops the viewed-room channel. The notification manager's background
    /// subscriptions are unaffected.
    pub async fn unmount(&self) {
        if let Some(channel) = self.room_channel.lock().await.take() {
            channel.task.abort();
        }
    }

    fn upsert_room(&self, room: ChatRoom) {
        let mut state = self.state.lock().unwrap();
        match state.rooms.iter_mut().find(|r| r.id == room.id) {
            Some(existing) => *existing = room,
            None => state.rooms.push(room),
        }
        sort_rooms(&mut state.rooms);
    }

    /// The inline channel is 1:1 with the viewed room: subscribing a new room
    /// always unsubscribes the previous one first.
    async fn attach_room_channel(self: &Arc<Self>, room_id: &str) {
        let mut guard = self.room_channel.lock().await;
        if let Some(channel) = guard.as_ref() {
            if channel.room_id == room_id {
                return;
            }
        }
        if let Some(previous) = guard.take() {
            previous.task.abort();
        }
        if self.state.lock().unwrap().selected_room_id.as_deref() != Some(room_id) {
            return;
        }

        let topic = format!("chat.room.{}", room_id);
        let mut subscription = match self.realtime.subscribe(&topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                log::warn!("[CHAT] could not subscribe {}: {}", topic, e);
                return;
            }
        };

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                if envelope.event != "chat.message" {
                    continue;
                }
                match serde_json::from_value::<ChatMessage>(envelope.payload) {
                    Ok(message) => controller.append_message(message),
                    Err(e) => log::warn!("[CHAT] bad chat.message payload: {}", e),
                }
            }
        });
        *guard = Some(RoomChannel {
            room_id: room_id.to_string(),
            task,
        });
    }
}
