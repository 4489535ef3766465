use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::services::auth_manager::{AuthSessionManager, SessionSnapshot};
use crate::client::services::chat_api::ChatApi;
use crate::client::services::realtime::RealtimeConnector;
use crate::common::models::{ChatMessage, ChatRoom};

/// Ring-buffer capacity: only the most recent entries are kept.
pub const NOTIFICATION_CAP: usize = 25;
/// How long a toast stays up before auto-dismissing.
pub const TOAST_TTL: Duration = Duration::from_secs(5);
/// Interval of the room re-list that picks up newly created rooms.
pub const ROOM_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AppNotification {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub category: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationInput {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub data: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Best-effort sound played on each new notification. Failures are logged,
/// never propagated.
pub trait AudioCue: Send + Sync {
    fn play(&self) -> anyhow::Result<()>;
}

/// Default cue for headless hosts: nothing to play.
pub struct NullAudioCue;

impl AudioCue for NullAudioCue {
    fn play(&self) -> anyhow::Result<()> {
        log::debug!("[NOTIFY] audio cue (no output device configured)");
        Ok(())
    }
}

struct NotificationState {
    notifications: VecDeque<AppNotification>,
    toast: Option<(AppNotification, Instant)>,
    room_cache: HashMap<String, ChatRoom>,
    current_user_id: Option<String>,
    audio_unlocked: bool,
    enabled: bool,
}

impl NotificationState {
    fn new() -> Self {
        Self {
            notifications: VecDeque::new(),
            toast: None,
            room_cache: HashMap::new(),
            current_user_id: None,
            audio_unlocked: false,
            enabled: false,
        }
    }
}

/// Cross-cutting notification service: one background realtime subscription
/// per room for the lifetime of the authenticated session, an in-app ring
/// buffer with unread count, a transient toast and a best-effort audio cue.
pub struct NotificationManager {
    chat: Arc<dyn ChatApi>,
    realtime: Arc<dyn RealtimeConnector>,
    audio: Arc<dyn AudioCue>,
    state: Mutex<NotificationState>,
    channels: tokio::sync::Mutex<HashMap<String, JoinHandle<()>>>,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationManager {
    pub fn new(
        chat: Arc<dyn ChatApi>,
        realtime: Arc<dyn RealtimeConnector>,
        audio: Arc<dyn AudioCue>,
    ) -> Self {
        Self {
            chat,
            realtime,
            audio,
            state: Mutex::new(NotificationState::new()),
            channels: tokio::sync::Mutex::new(HashMap::new()),
            session_task: Mutex::new(None),
        }
    }

    /// Follows the session: subscriptions are built on login, torn down on
    /// logout, and the room list is re-synced on a fixed interval while
    /// authenticated.
    pub fn start(self: &Arc<Self>, auth: &AuthSessionManager) {
        let mut events = auth.subscribe();
        let initial = auth.snapshot();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.apply_session(initial).await;
            let mut tick = tokio::time::interval(ROOM_REFRESH_INTERVAL);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it.
            tick.tick().await;
            loop {
                tokio::select! {
                    maybe = events.recv() => match maybe {
                        Some(snapshot) => manager.apply_session(snapshot).await,
                        None => break,
                    },
                    _ = tick.tick() => manager.sync_rooms().await,
                }
            }
        });
        let previous = self.session_task.lock().unwrap().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub async fn stop(&self) {
        if let Some(task) = self.session_task.lock().unwrap().take() {
            task.abort();
        }
        self.teardown().await;
    }

    pub(crate) async fn apply_session(self: &Arc<Self>, snapshot: SessionSnapshot) {
        if snapshot.is_authenticated() {
            let first_enable = {
                let mut state = self.state.lock().unwrap();
                let first = !state.enabled;
                state.enabled = true;
                state.current_user_id = snapshot.external_user_id();
                first
            };
            if first_enable {
                self.sync_rooms().await;
            }
        } else {
            self.teardown().await;
        }
    }

    /// Re-lists rooms and upserts subscriptions. Already-subscribed rooms are
    /// left untouched; failures are logged only.
    pub async fn sync_rooms(self: &Arc<Self>) {
        if !self.state.lock().unwrap().enabled {
            return;
        }
        match self.chat.list_rooms().await {
            Ok(rooms) => {
                for room in rooms {
                    self.subscribe_room(&room).await;
                }
            }
            Err(e) => log::error!("[NOTIFY] could not sync chat rooms: {}", e),
        }
    }

    /// Idempotent: one background subscription per room id. The room summary
    /// is cached (and refreshed) for notification labelling either way.
    pub async fn subscribe_room(self: &Arc<Self>, room: &ChatRoom) {
        {
            let mut state = self.state.lock().unwrap();
            if !state.enabled {
                return;
            }
            state.room_cache.insert(room.id.clone(), room.clone());
        }

        let mut channels = self.channels.lock().await;
        if channels.contains_key(&room.id) {
            return;
        }

        let topic = format!("chat.room.{}", room.id);
        let mut subscription = match self.realtime.subscribe(&topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                log::warn!("[NOTIFY] could not subscribe {}: {}", topic, e);
                return;
            }
        };

        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                if envelope.event != "chat.message" {
                    continue;
                }
                match serde_json::from_value::<ChatMessage>(envelope.payload) {
                    Ok(message) => manager.register_chat_message(message),
                    Err(e) => log::warn!("[NOTIFY] bad chat.message payload: {}", e),
                }
            }
        });
        channels.insert(room.id.clone(), task);
    }

    /// Converts an incoming chat event into a notification. The user's own
    /// outgoing messages never notify.
    pub(crate) fn register_chat_message(&self, message: ChatMessage) {
        let notification = {
            let state = self.state.lock().unwrap();
            if !state.enabled {
                return;
            }
            if state.current_user_id.as_deref() == Some(message.sender_user_id.as_str()) {
                return;
            }
            let Some(room) = state.room_cache.get(&message.room_id) else {
                return;
            };
            AppNotification {
                id: message.id.clone(),
                title: room.display_name(state.current_user_id.as_deref()),
                description: message.content.clone(),
                created_at: message.created_at,
                category: Some("chat".to_string()),
                data: json!({ "roomId": message.room_id, "message": message }),
                is_read: false,
            }
        };
        self.push(notification);
    }

    pub fn notify(&self, input: NotificationInput) {
        let notification = AppNotification {
            id: input
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: input.title,
            description: input.description,
            created_at: input.created_at.unwrap_or_else(Utc::now),
            category: input.category,
            data: input.data.unwrap_or(serde_json::Value::Null),
            is_read: false,
        };
        self.push(notification);
    }

    fn push(&self, notification: AppNotification) {
        {
            let mut state = self.state.lock().unwrap();
            if state.notifications.iter().any(|n| n.id == notification.id) {
                return;
            }
            state.notifications.push_front(notification.clone());
            state.notifications.truncate(NOTIFICATION_CAP);
            state.toast = Some((notification, Instant::now()));
        }
        self.play_cue();
    }

    /// The audio cue stays silent until the host reports a user interaction;
    /// playback before that would be blocked anyway.
    pub fn unlock_audio(&self) {
        self.state.lock().unwrap().audio_unlocked = true;
    }

    fn play_cue(&self) {
        let unlocked = self.state.lock().unwrap().audio_unlocked;
        if !unlocked {
            log::debug!("[NOTIFY] audio still locked, skipping cue");
            return;
        }
        if let Err(e) = self.audio.play() {
            log::warn!("[NOTIFY] could not play the notification cue: {}", e);
        }
    }

    pub fn notifications(&self) -> Vec<AppNotification> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .cloned()
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| !n.is_read)
            .count()
    }

    /// Current toast, if it has not expired yet. Expired toasts are cleared
    /// on read.
    pub fn toast(&self) -> Option<AppNotification> {
        let mut state = self.state.lock().unwrap();
        match &state.toast {
            Some((notification, shown_at)) if shown_at.elapsed() < TOAST_TTL => {
                Some(notification.clone())
            }
            Some(_) => {
                state.toast = None;
                None
            }
            None => None,
        }
    }

    pub fn dismiss_toast(&self) {
        self.state.lock().unwrap().toast = None;
    }

    pub fn mark_read(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        for notification in state.notifications.iter_mut() {
            if notification.id == id {
                notification.is_read = true;
            }
        }
    }

    pub fn mark_all_read(&self) {
        let mut state = self.state.lock().unwrap();
        for notification in state.notifications.iter_mut() {
            notification.is_read = true;
        }
    }

    async fn teardown(&self) {
        let mut channels = self.channels.lock().await;
        for (_, task) in channels.drain() {
            task.abort();
        }
        let mut state = self.state.lock().unwrap();
        state.room_cache.clear();
        state.notifications.clear();
        state.toast = None;
        state.enabled = false;
        state.current_user_id = None;
    }

    #[cfg(test)]
    async fn subscribed_room_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::auth_manager::SessionPhase;
    use crate::client::test_support::{
        sample_message, sample_room, sample_user, FakeChatApi, FakeRealtimeConnector,
    };
    use std::collections::BTreeSet;

    fn authenticated_snapshot(user_id: &str) -> SessionSnapshot {
        SessionSnapshot {
            token: Some("token".to_string()),
            user: Some(sample_user(user_id)),
            profile: None,
            phase: SessionPhase::Ready,
            is_processing: false,
            accessible_page_keys: BTreeSet::new(),
        }
    }

    fn anonymous_snapshot() -> SessionSnapshot {
        SessionSnapshot::default()
    }

    fn manager_with(
        chat: Arc<FakeChatApi>,
        realtime: Arc<FakeRealtimeConnector>,
    ) -> Arc<NotificationManager> {
        Arc::new(NotificationManager::new(
            chat,
            realtime,
            Arc::new(NullAudioCue),
        ))
    }

    #[tokio::test]
    async fn own_messages_never_notify() {
        let chat = Arc::new(FakeChatApi::default());
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let manager = manager_with(chat, realtime);

        manager.apply_session(authenticated_snapshot("me")).await;
        manager.subscribe_room(&sample_room("r1", 0)).await;

        manager.register_chat_message(sample_message("m1", "r1", "me", 10));
        assert!(manager.notifications().is_empty());

        manager.register_chat_message(sample_message("m2", "r1", "them", 11));
        let notifications = manager.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].id, "m2");
        assert_eq!(manager.unread_count(), 1);
    }

    #[tokio::test]
    async fn room_subscriptions_are_idempotent() {
        let chat = Arc::new(FakeChatApi::default());
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let manager = manager_with(chat, realtime.clone());

        manager.apply_session(authenticated_snapshot("me")).await;
        let room = sample_room("r1", 0);
        manager.subscribe_room(&room).await;
        manager.subscribe_room(&room).await;

        assert_eq!(realtime.subscribe_count("chat.room.r1"), 1);
        assert_eq!(manager.subscribed_room_count().await, 1);
    }

    #[tokio::test]
    async fn sync_rooms_picks_up_new_rooms() {
        let chat = Arc::new(FakeChatApi::default());
        chat.rooms.lock().unwrap().push(sample_room("r1", 0));
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let manager = manager_with(chat.clone(), realtime.clone());

        manager.apply_session(authenticated_snapshot("me")).await;
        assert_eq!(realtime.subscribe_count("chat.room.r1"), 1);

        chat.rooms.lock().unwrap().push(sample_room("r2", 1));
        manager.sync_rooms().await;
        assert_eq!(realtime.subscribe_count("chat.room.r1"), 1);
        assert_eq!(realtime.subscribe_count("chat.room.r2"), 1);
    }

    #[tokio::test]
    async fn realtime_events_flow_into_the_buffer() {
        let chat = Arc::new(FakeChatApi::default());
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let manager = manager_with(chat, realtime.clone());

        manager.apply_session(authenticated_snapshot("me")).await;
        manager.subscribe_room(&sample_room("r1", 0)).await;

        realtime.emit_chat_message("r1", &sample_message("m1", "r1", "them", 5));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(manager.notifications().len(), 1);
        assert!(manager.toast().is_some());
        manager.dismiss_toast();
        assert!(manager.toast().is_none());
    }

    #[tokio::test]
    async fn the_buffer_is_capped_at_twenty_five() {
        let chat = Arc::new(FakeChatApi::default());
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let manager = manager_with(chat, realtime);
        manager.apply_session(authenticated_snapshot("me")).await;

        for i in 0..40 {
            manager.notify(NotificationInput {
                title: format!("note {}", i),
                description: "body".to_string(),
                ..NotificationInput::default()
            });
        }

        let notifications = manager.notifications();
        assert_eq!(notifications.len(), NOTIFICATION_CAP);
        // Newest first.
        assert_eq!(notifications[0].title, "note 39");
    }

    #[tokio::test]
    async fn duplicate_ids_are_dropped() {
        let chat = Arc::new(FakeChatApi::default());
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let manager = manager_with(chat, realtime);
        manager.apply_session(authenticated_snapshot("me")).await;

        for _ in 0..2 {
            manager.notify(NotificationInput {
                id: Some("n1".to_string()),
                title: "once".to_string(),
                description: "body".to_string(),
                ..NotificationInput::default()
            });
        }
        assert_eq!(manager.notifications().len(), 1);
    }

    #[tokio::test]
    async fn logout_tears_everything_down_and_login_rebuilds() {
        let chat = Arc::new(FakeChatApi::default());
        chat.rooms.lock().unwrap().push(sample_room("r1", 0));
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let manager = manager_with(chat, realtime.clone());

        manager.apply_session(authenticated_snapshot("me")).await;
        manager.notify(NotificationInput {
            title: "pending".to_string(),
            description: "body".to_string(),
            ..NotificationInput::default()
        });
        assert_eq!(manager.subscribed_room_count().await, 1);

        manager.apply_session(anonymous_snapshot()).await;
        assert_eq!(manager.subscribed_room_count().await, 0);
        assert!(manager.notifications().is_empty());
        assert!(manager.toast().is_none());

        manager.apply_session(authenticated_snapshot("me")).await;
        assert_eq!(manager.subscribed_room_count().await, 1);
        assert_eq!(realtime.subscribe_count("chat.room.r1"), 2);
    }

    #[tokio::test]
    async fn mark_read_updates_the_unread_count() {
        let chat = Arc::new(FakeChatApi::default());
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let manager = manager_with(chat, realtime);
        manager.apply_session(authenticated_snapshot("me")).await;

        manager.notify(NotificationInput {
            id: Some("n1".to_string()),
            title: "a".to_string(),
            description: "b".to_string(),
            ..NotificationInput::default()
        });
        manager.notify(NotificationInput {
            id: Some("n2".to_string()),
            title: "c".to_string(),
            description: "d".to_string(),
            ..NotificationInput::default()
        });
        assert_eq!(manager.unread_count(), 2);

        manager.mark_read("n1");
        assert_eq!(manager.unread_count(), 1);
        manager.mark_all_read();
        assert_eq!(manager.unread_count(), 0);
    }
}
