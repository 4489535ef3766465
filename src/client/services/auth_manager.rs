use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::client::services::access_control_api::AccessControlApi;
use crate::client::services::auth_api::{AuthApi, LoginPayload, RegisterPayload, RegisterResponse};
use crate::client::services::http_client::ApiError;
use crate::client::services::platform_auth::IdentityPlatform;
use crate::client::utils::session_store::SessionStore;
use crate::common::models::{accessible_page_keys, AuthUser, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
}

/// Immutable view of the session. Everything outside the manager reads these;
/// only the manager mutates the underlying state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub token: Option<String>,
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub phase: SessionPhase,
    pub is_processing: bool,
    pub accessible_page_keys: BTreeSet<String>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_initializing(&self) -> bool {
        self.phase != SessionPhase::Ready
    }

    pub fn can_access_page(&self, page_key: &str) -> bool {
        self.accessible_page_keys.contains(page_key)
    }

    /// Identity used to compare against chat senders and participants: the
    /// profile's external id when a profile exists, the raw user id otherwise.
    pub fn external_user_id(&self) -> Option<String> {
        self.profile
            .as_ref()
            .map(|p| p.external_user_id.clone())
            .or_else(|| self.user.as_ref().map(|u| u.id.clone()))
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            token: None,
            user: None,
            profile: None,
            phase: SessionPhase::Uninitialized,
            is_processing: false,
            accessible_page_keys: BTreeSet::new(),
        }
    }
}

/// Owns the session: hydration, login/logout/register, profile refresh and
/// the page-permission predicate. Persists every commit as a side effect and
/// notifies subscribers with a fresh snapshot.
pub struct AuthSessionManager {
    store: Arc<SessionStore>,
    auth_api: Arc<dyn AuthApi>,
    access_control: Arc<dyn AccessControlApi>,
    platform: Arc<dyn IdentityPlatform>,
    state: Mutex<SessionSnapshot>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionSnapshot>>>,
}

impl AuthSessionManager {
    pub fn new(
        store: Arc<SessionStore>,
        auth_api: Arc<dyn AuthApi>,
        access_control: Arc<dyn AccessControlApi>,
        platform: Arc<dyn IdentityPlatform>,
    ) -> Self {
        Self {
            store,
            auth_api,
            access_control,
            platform,
            state: Mutex::new(SessionSnapshot::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().unwrap().clone()
    }

    pub fn can_access_page(&self, page_key: &str) -> bool {
        self.state.lock().unwrap().can_access_page(page_key)
    }

    /// Registers an observer. Every commit (and phase/processing change)
    /// delivers a snapshot; dropped receivers are pruned on the next notify.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Startup path: commit the persisted session immediately, then reconcile
    /// with the identity platform. A platform session with a different access
    /// token supersedes the stored one; the profile prefetch is best-effort.
    pub async fn hydrate(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.phase != SessionPhase::Uninitialized {
                return;
            }
            state.phase = SessionPhase::Initializing;
        }

        let stored = self.store.load();
        self.commit(stored.token, stored.user, stored.profile);

        match self.platform.current_session().await {
            Ok(Some(platform_session)) => {
                let known_token = self.state.lock().unwrap().token.clone();
                if known_token.as_deref() != Some(platform_session.access_token.as_str()) {
                    let profile = match self
                        .access_control
                        .get_profile(&platform_session.user.id)
                        .await
                    {
                        Ok(profile) => Some(profile),
                        Err(e) => {
                            log::info!("[AUTH] no profile during platform hydration: {}", e);
                            None
                        }
                    };
                    self.commit(
                        Some(platform_session.access_token),
                        Some(platform_session.user),
                        profile,
                    );
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("[AUTH] platform session lookup failed: {}", e),
        }

        self.state.lock().unwrap().phase = SessionPhase::Ready;
        self.notify();
    }

    /// Credential login. The REST error propagates unchanged so callers can
    /// branch on status and server message.
    pub async fn login(&self, payload: &LoginPayload) -> Result<(), ApiError> {
        self.set_processing(true);
        let result = self.auth_api.login(payload).await;
        let outcome = match result {
            Ok(response) => {
                self.commit(
                    Some(response.access_token),
                    Some(response.user),
                    response.profile,
                );
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.set_processing(false);
        outcome
    }

    /// Registration never commits a session; the user still has to log in.
    pub async fn register(&self, payload: &RegisterPayload) -> Result<RegisterResponse, ApiError> {
        self.set_processing(true);
        let result = self.auth_api.register(payload).await;
        self.set_processing(false);
        result
    }

    /// OAuth entry point. Returns the authorize URL the shell must open; the
    /// session lands later through `hydrate` once the platform holds a token.
    pub async fn login_with_google(&self, redirect_to: &str) -> anyhow::Result<String> {
        self.set_processing(true);
        let result = self.platform.oauth_authorize_url("google", redirect_to);
        self.set_processing(false);
        result
    }

    /// Best-effort platform sign-out, then an unconditional local wipe.
    pub async fn logout(&self) {
        let token = self.state.lock().unwrap().token.clone();
        if let Some(token) = token {
            if let Err(e) = self.platform.sign_out(&token).await {
                log::error!("[AUTH] platform sign-out failed: {}", e);
            }
        }
        self.commit(None, None, None);
    }

    /// Re-fetches the profile for the current identity and recommits. No-op
    /// without an active session; fetch failures are logged, not surfaced.
    pub async fn refresh_profile(&self) {
        let snapshot = self.snapshot();
        let (Some(token), Some(user)) = (snapshot.token, snapshot.user) else {
            return;
        };
        let external_id = snapshot
            .profile
            .map(|p| p.external_user_id)
            .unwrap_or_else(|| user.id.clone());

        match self.access_control.get_profile(&external_id).await {
            Ok(profile) => self.commit(Some(token), Some(user), Some(profile)),
            Err(e) => log::error!("[AUTH] could not refresh profile: {}", e),
        }
    }

    /// Single commit point: updates state, recomputes the accessible page
    /// keys, persists (or clears) storage and notifies subscribers.
    fn commit(&self, token: Option<String>, user: Option<AuthUser>, profile: Option<Profile>) {
        let persist = match (&token, &user) {
            (Some(token), Some(user)) => Some((token.clone(), user.clone(), profile.clone())),
            _ => None,
        };

        {
            let mut state = self.state.lock().unwrap();
            state.accessible_page_keys = accessible_page_keys(profile.as_ref());
            state.token = token;
            state.user = user;
            state.profile = profile;
        }

        match persist {
            Some((token, user, profile)) => {
                if let Err(e) = self.store.save(&token, &user, profile.as_ref()) {
                    log::warn!("[AUTH] could not persist session: {}", e);
                }
            }
            None => self.store.clear(),
        }

        self.notify();
    }

    fn set_processing(&self, value: bool) {
        self.state.lock().unwrap().is_processing = value;
        self.notify();
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::platform_auth::PlatformSession;
    use crate::client::test_support::{
        sample_profile, sample_user, FakeAccessControlApi, FakeAuthApi, FakeIdentityPlatform,
    };

    fn manager_with(
        dir: &std::path::Path,
        auth_api: Arc<FakeAuthApi>,
        access: Arc<FakeAccessControlApi>,
        platform: Arc<FakeIdentityPlatform>,
    ) -> AuthSessionManager {
        AuthSessionManager::new(
            Arc::new(SessionStore::file_backed(dir)),
            auth_api,
            access,
            platform,
        )
    }

    #[tokio::test]
    async fn hydrate_restores_a_stored_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::file_backed(dir.path());
        store.save("stored-token", &sample_user("u1"), None).unwrap();

        let manager = manager_with(
            dir.path(),
            Arc::new(FakeAuthApi::default()),
            Arc::new(FakeAccessControlApi::default()),
            Arc::new(FakeIdentityPlatform::default()),
        );
        assert!(manager.snapshot().is_initializing());

        manager.hydrate().await;
        let snapshot = manager.snapshot();
        assert!(snapshot.is_authenticated());
        assert!(!snapshot.is_initializing());
        assert_eq!(snapshot.token.as_deref(), Some("stored-token"));
    }

    #[tokio::test]
    async fn hydrate_reconciles_a_newer_platform_token() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(FakeAccessControlApi::default());
        access
            .profiles
            .lock()
            .unwrap()
            .push(sample_profile("u1", &["dashboard.home"]));
        let platform = Arc::new(FakeIdentityPlatform::default());
        *platform.session.lock().unwrap() = Some(PlatformSession {
            access_token: "platform-token".to_string(),
            user: sample_user("u1"),
        });

        let manager = manager_with(
            dir.path(),
            Arc::new(FakeAuthApi::default()),
            access.clone(),
            platform,
        );
        manager.hydrate().await;

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.token.as_deref(), Some("platform-token"));
        assert!(snapshot.can_access_page("dashboard.home"));
        assert_eq!(access.call_count("get_profile"), 1);
    }

    #[tokio::test]
    async fn hydrate_skips_the_profile_fetch_when_tokens_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::file_backed(dir.path());
        store.save("same-token", &sample_user("u1"), None).unwrap();

        let access = Arc::new(FakeAccessControlApi::default());
        let platform = Arc::new(FakeIdentityPlatform::default());
        *platform.session.lock().unwrap() = Some(PlatformSession {
            access_token: "same-token".to_string(),
            user: sample_user("u1"),
        });

        let manager = manager_with(
            dir.path(),
            Arc::new(FakeAuthApi::default()),
            access.clone(),
            platform,
        );
        manager.hydrate().await;

        assert_eq!(access.call_count("get_profile"), 0);
        assert_eq!(manager.snapshot().token.as_deref(), Some("same-token"));
    }

    #[tokio::test]
    async fn login_persists_enough_to_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let auth_api = Arc::new(FakeAuthApi::default());
        auth_api.accept(
            "fresh-token",
            sample_user("u1"),
            Some(sample_profile("u1", &["dashboard.chat"])),
        );

        let manager = manager_with(
            dir.path(),
            auth_api,
            Arc::new(FakeAccessControlApi::default()),
            Arc::new(FakeIdentityPlatform::default()),
        );
        manager
            .login(&LoginPayload {
                email: "u1@example.com".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        assert!(manager.snapshot().can_access_page("dashboard.chat"));

        // A second manager over the same storage reproduces the session.
        let reloaded = manager_with(
            dir.path(),
            Arc::new(FakeAuthApi::default()),
            Arc::new(FakeAccessControlApi::default()),
            Arc::new(FakeIdentityPlatform::default()),
        );
        reloaded.hydrate().await;
        let snapshot = reloaded.snapshot();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.token.as_deref(), Some("fresh-token"));
        assert!(snapshot.can_access_page("dashboard.chat"));
    }

    #[tokio::test]
    async fn login_failure_propagates_the_rest_error() {
        let dir = tempfile::tempdir().unwrap();
        let auth_api = Arc::new(FakeAuthApi::default());
        auth_api.reject(401, "invalid credentials");

        let manager = manager_with(
            dir.path(),
            auth_api,
            Arc::new(FakeAccessControlApi::default()),
            Arc::new(FakeIdentityPlatform::default()),
        );
        let err = manager
            .login(&LoginPayload {
                email: "u1@example.com".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.server_message(), Some("invalid credentials"));
        assert!(!manager.snapshot().is_authenticated());
        assert!(!manager.snapshot().is_processing);
    }

    #[tokio::test]
    async fn logout_clears_memory_and_storage_even_if_sign_out_fails() {
        let dir = tempfile::tempdir().unwrap();
        let auth_api = Arc::new(FakeAuthApi::default());
        auth_api.accept("token", sample_user("u1"), None);
        let platform = Arc::new(FakeIdentityPlatform::default());
        platform.fail_sign_out();

        let manager = manager_with(
            dir.path(),
            auth_api,
            Arc::new(FakeAccessControlApi::default()),
            platform.clone(),
        );
        manager
            .login(&LoginPayload {
                email: "u1@example.com".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();

        manager.logout().await;
        assert_eq!(platform.sign_out_calls(), 1);

        let snapshot = manager.snapshot();
        assert!(snapshot.token.is_none());
        assert!(snapshot.user.is_none());
        assert!(snapshot.profile.is_none());

        let stored = SessionStore::file_backed(dir.path()).load();
        assert!(stored.token.is_none() && stored.user.is_none() && stored.profile.is_none());
    }

    #[tokio::test]
    async fn anonymous_sessions_can_access_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(
            dir.path(),
            Arc::new(FakeAuthApi::default()),
            Arc::new(FakeAccessControlApi::default()),
            Arc::new(FakeIdentityPlatform::default()),
        );
        manager.hydrate().await;
        assert!(!manager.can_access_page("dashboard.home"));
        assert!(!manager.can_access_page("anything.else"));
    }

    #[tokio::test]
    async fn register_does_not_mutate_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let auth_api = Arc::new(FakeAuthApi::default());
        let manager = manager_with(
            dir.path(),
            auth_api,
            Arc::new(FakeAccessControlApi::default()),
            Arc::new(FakeIdentityPlatform::default()),
        );

        manager
            .register(&RegisterPayload {
                email: "new@example.com".to_string(),
                password: "secret".to_string(),
                display_name: "New User".to_string(),
                user_type_id: None,
            })
            .await
            .unwrap();
        assert!(!manager.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn subscribers_receive_snapshots_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let auth_api = Arc::new(FakeAuthApi::default());
        auth_api.accept("token", sample_user("u1"), None);
        let manager = manager_with(
            dir.path(),
            auth_api,
            Arc::new(FakeAccessControlApi::default()),
            Arc::new(FakeIdentityPlatform::default()),
        );

        let mut events = manager.subscribe();
        manager
            .login(&LoginPayload {
                email: "u1@example.com".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();

        let mut authenticated = false;
        while let Ok(snapshot) = events.try_recv() {
            authenticated = snapshot.is_authenticated() || authenticated;
        }
        assert!(authenticated);
    }
}
