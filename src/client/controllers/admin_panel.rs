use std::sync::{Arc, Mutex};

use crate::client::services::access_control_api::{
    AccessControlApi, CreatePagePayload, CreatePageRolePayload, CreateUserGroupPayload,
    CreateUserTypePayload, UpdateProfileUserTypePayload,
};
use crate::client::services::auth_manager::AuthSessionManager;
use crate::common::models::{Page, PageRole, Profile, UserGroup, UserType};

const LOAD_ERROR: &str = "Could not load access control data.";
const CREATE_GROUP_ERROR: &str = "Could not create the group.";
const CREATE_TYPE_ERROR: &str = "Could not create the user type.";
const CREATE_PAGE_ERROR: &str = "Could not register the page.";
const CREATE_ROLE_ERROR: &str = "Could not link the role.";
const REMOVE_ROLE_ERROR: &str = "Could not remove the role.";
const UPDATE_PROFILE_ERROR: &str = "Could not update the profile.";
const ROLE_VALIDATION_ERROR: &str = "Select a user type, a page and a role label.";

#[derive(Debug, Clone)]
pub struct GroupForm {
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

impl Default for GroupForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserTypeForm {
    pub name: String,
    pub description: String,
    pub user_group_id: String,
    pub is_active: bool,
}

impl Default for UserTypeForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            user_group_id: String::new(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageForm {
    pub key: String,
    pub name: String,
    pub path: String,
    pub description: String,
    pub is_active: bool,
}

impl Default for PageForm {
    fn default() -> Self {
        Self {
            key: String::new(),
            name: String::new(),
            path: String::new(),
            description: String::new(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleForm {
    pub user_type_id: String,
    pub page_id: String,
    pub role: String,
}

#[derive(Debug, Clone, Default)]
pub struct AdminPanelState {
    pub profiles: Vec<Profile>,
    pub user_groups: Vec<UserGroup>,
    pub user_types: Vec<UserType>,
    pub pages: Vec<Page>,
    pub page_roles: Vec<PageRole>,
    pub group_form: GroupForm,
    pub user_type_form: UserTypeForm,
    pub page_form: PageForm,
    pub role_form: RoleForm,
    pub is_loading: bool,
    pub error_message: Option<String>,
    pub status_message: Option<String>,
    pub pending_action: Option<String>,
    load_generation: u64,
}

impl AdminPanelState {
    /// Profiles ordered for display, by name with the external id as tiebreak.
    pub fn sorted_profiles(&self) -> Vec<Profile> {
        let mut profiles = self.profiles.clone();
        profiles.sort_by(|a, b| {
            let left = a.display_name.as_deref().unwrap_or(&a.external_user_id);
            let right = b.display_name.as_deref().unwrap_or(&b.external_user_id);
            left.cmp(right)
        });
        profiles
    }

    pub fn active_user_types(&self) -> Vec<&UserType> {
        self.user_types.iter().filter(|t| t.is_active).collect()
    }
}

/// Orchestrates the access-control admin screen: loads the five collections,
/// runs the mutations and tracks per-action pending/error/status state.
pub struct AdminPanelController {
    access: Arc<dyn AccessControlApi>,
    auth: Arc<AuthSessionManager>,
    state: Mutex<AdminPanelState>,
}

impl AdminPanelController {
    pub fn new(access: Arc<dyn AccessControlApi>, auth: Arc<AuthSessionManager>) -> Self {
        Self {
            access,
            auth,
            state: Mutex::new(AdminPanelState {
                is_loading: true,
                ..AdminPanelState::default()
            }),
        }
    }

    pub fn state(&self) -> AdminPanelState {
        self.state.lock().unwrap().clone()
    }

    /// Whether `key` identifies the in-flight action. The view disables the
    /// matching control while this holds.
    pub fn is_busy(&self, key: &str) -> bool {
        self.state.lock().unwrap().pending_action.as_deref() == Some(key)
    }

    pub fn update_group_form(&self, update: impl FnOnce(&mut GroupForm)) {
        update(&mut self.state.lock().unwrap().group_form);
    }

    pub fn update_user_type_form(&self, update: impl FnOnce(&mut UserTypeForm)) {
        update(&mut self.state.lock().unwrap().user_type_form);
    }

    pub fn update_page_form(&self, update: impl FnOnce(&mut PageForm)) {
        update(&mut self.state.lock().unwrap().page_form);
    }

    pub fn update_role_form(&self, update: impl FnOnce(&mut RoleForm)) {
        update(&mut self.state.lock().unwrap().role_form);
    }

    /// Loads the five collections concurrently. `silent` keeps the loading
    /// indicator untouched (used after mutations to avoid flicker). A stale
    /// load superseded by a newer one discards its results.
    pub async fn load(&self, silent: bool) {
        let generation = {
            let mut state = self.state.lock().unwrap();
            state.load_generation += 1;
            if !silent {
                state.is_loading = true;
            }
            state.error_message = None;
            state.load_generation
        };

        let (profiles, user_groups, user_types, pages, page_roles) = tokio::join!(
            self.access.list_profiles(),
            self.access.list_user_groups(),
            self.access.list_user_types(),
            self.access.list_pages(),
            self.access.list_page_roles(),
        );

        let mut state = self.state.lock().unwrap();
        if state.load_generation != generation {
            return;
        }

        match (profiles, user_groups, user_types, pages, page_roles) {
            (Ok(profiles), Ok(user_groups), Ok(user_types), Ok(pages), Ok(page_roles)) => {
                state.profiles = profiles;
                state.user_groups = user_groups;
                state.user_types = user_types;
                state.pages = pages;
                state.page_roles = page_roles;
            }
            (profiles, user_groups, user_types, pages, page_roles) => {
                let first = [
                    profiles.err(),
                    user_groups.err(),
                    user_types.err(),
                    pages.err(),
                    page_roles.err(),
                ]
                .into_iter()
                .flatten()
                .next();
                if let Some(e) = first {
                    state.error_message = Some(e.user_message(LOAD_ERROR));
                }
            }
        }

        if !silent {
            state.is_loading = false;
        }
    }

    pub async fn refresh(&self) {
        self.load(false).await;
    }

    pub async fn create_group(&self) {
        let payload = {
            let state = self.state.lock().unwrap();
            CreateUserGroupPayload {
                name: state.group_form.name.clone(),
                description: non_empty(&state.group_form.description),
                is_active: Some(state.group_form.is_active),
            }
        };
        self.begin("create-group");
        match self.access.create_user_group(&payload).await {
            Ok(_) => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.group_form = GroupForm::default();
                    state.status_message = Some("Group created.".to_string());
                }
                self.load(true).await;
            }
            Err(e) => self.set_error(e.user_message(CREATE_GROUP_ERROR)),
        }
        self.clear_pending();
    }

    pub async fn create_user_type(&self) {
        let payload = {
            let state = self.state.lock().unwrap();
            CreateUserTypePayload {
                name: state.user_type_form.name.clone(),
                description: non_empty(&state.user_type_form.description),
                is_active: Some(state.user_type_form.is_active),
                user_group_id: non_empty(&state.user_type_form.user_group_id),
            }
        };
        self.begin("create-user-type");
        match self.access.create_user_type(&payload).await {
            Ok(_) => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.user_type_form = UserTypeForm::default();
                    state.status_message = Some("User type created.".to_string());
                }
                self.load(true).await;
            }
            Err(e) => self.set_error(e.user_message(CREATE_TYPE_ERROR)),
        }
        self.clear_pending();
    }

    pub async fn create_page(&self) {
        let payload = {
            let state = self.state.lock().unwrap();
            CreatePagePayload {
                key: state.page_form.key.clone(),
                name: state.page_form.name.clone(),
                path: non_empty(&state.page_form.path),
                description: non_empty(&state.page_form.description),
                is_active: Some(state.page_form.is_active),
            }
        };
        self.begin("create-page");
        match self.access.create_page(&payload).await {
            Ok(_) => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.page_form = PageForm::default();
                    state.status_message = Some("Page registered.".to_string());
                }
                self.load(true).await;
            }
            Err(e) => self.set_error(e.user_message(CREATE_PAGE_ERROR)),
        }
        self.clear_pending();
    }

    /// Role creation validates locally first: an incomplete form never
    /// reaches the network.
    pub async fn create_role(&self) {
        let form = self.state.lock().unwrap().role_form.clone();
        if form.user_type_id.trim().is_empty()
            || form.page_id.trim().is_empty()
            || form.role.trim().is_empty()
        {
            self.set_error(ROLE_VALIDATION_ERROR.to_string());
            return;
        }

        self.begin("create-role");
        let payload = CreatePageRolePayload {
            user_type_id: form.user_type_id,
            page_id: form.page_id,
            role: form.role,
        };
        match self.access.create_page_role(&payload).await {
            Ok(_) => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.role_form = RoleForm::default();
                    state.status_message = Some("Role linked.".to_string());
                }
                self.load(true).await;
            }
            Err(e) => self.set_error(e.user_message(CREATE_ROLE_ERROR)),
        }
        self.clear_pending();
    }

    pub async fn remove_role(&self, role_id: &str) {
        self.begin(&format!("delete-role-{}", role_id));
        match self.access.delete_page_role(role_id).await {
            Ok(_) => {
                self.state.lock().unwrap().status_message = Some("Role removed.".to_string());
                self.load(true).await;
            }
            Err(e) => self.set_error(e.user_message(REMOVE_ROLE_ERROR)),
        }
        self.clear_pending();
    }

    /// Reassigns a profile's user type. When the affected profile is the
    /// caller's own, the session manager refreshes so permission-derived UI
    /// updates immediately.
    pub async fn change_profile_user_type(
        &self,
        external_user_id: &str,
        user_type_id: Option<String>,
    ) {
        self.begin(&format!("profile-{}", external_user_id));
        let payload = UpdateProfileUserTypePayload { user_type_id };
        match self
            .access
            .update_profile_user_type(external_user_id, &payload)
            .await
        {
            Ok(updated) => {
                {
                    let mut state = self.state.lock().unwrap();
                    if let Some(existing) = state
                        .profiles
                        .iter_mut()
                        .find(|p| p.external_user_id == updated.external_user_id)
                    {
                        *existing = updated.clone();
                    }
                    state.status_message = Some("Profile updated.".to_string());
                }
                let own = self.auth.snapshot().external_user_id().as_deref()
                    == Some(external_user_id);
                if own {
                    self.auth.refresh_profile().await;
                }
            }
            Err(e) => self.set_error(e.user_message(UPDATE_PROFILE_ERROR)),
        }
        self.clear_pending();
    }

    fn begin(&self, action: &str) {
        let mut state = self.state.lock().unwrap();
        state.pending_action = Some(action.to_string());
        state.status_message = None;
        state.error_message = None;
    }

    fn set_error(&self, message: String) {
        self.state.lock().unwrap().error_message = Some(message);
    }

    fn clear_pending(&self) {
        self.state.lock().unwrap().pending_action = None;
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::auth_api::LoginPayload;
    use crate::client::test_support::{
        sample_profile, sample_user, FakeAccessControlApi, FakeAuthApi, FakeIdentityPlatform,
    };
    use crate::client::utils::session_store::SessionStore;

    async fn auth_with_identity(
        dir: &std::path::Path,
        access: Arc<FakeAccessControlApi>,
        external_id: &str,
    ) -> Arc<AuthSessionManager> {
        let auth_api = Arc::new(FakeAuthApi::default());
        auth_api.accept(
            "token",
            sample_user(external_id),
            Some(sample_profile(external_id, &["dashboard.access"])),
        );
        let manager = Arc::new(AuthSessionManager::new(
            Arc::new(SessionStore::file_backed(dir)),
            auth_api,
            access,
            Arc::new(FakeIdentityPlatform::default()),
        ));
        manager
            .login(&LoginPayload {
                email: format!("{}@example.com", external_id),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        manager
    }

    fn anonymous_auth(dir: &std::path::Path, access: Arc<FakeAccessControlApi>) -> Arc<AuthSessionManager> {
        Arc::new(AuthSessionManager::new(
            Arc::new(SessionStore::file_backed(dir)),
            Arc::new(FakeAuthApi::default()),
            access,
            Arc::new(FakeIdentityPlatform::default()),
        ))
    }

    #[tokio::test]
    async fn load_fills_the_five_collections() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(FakeAccessControlApi::default());
        access
            .profiles
            .lock()
            .unwrap()
            .push(sample_profile("u1", &[]));
        let controller =
            AdminPanelController::new(access.clone(), anonymous_auth(dir.path(), access.clone()));

        assert!(controller.state().is_loading);
        controller.load(false).await;

        let state = controller.state();
        assert!(!state.is_loading);
        assert_eq!(state.profiles.len(), 1);
        assert_eq!(access.call_count("list_profiles"), 1);
        assert_eq!(access.call_count("list_user_groups"), 1);
        assert_eq!(access.call_count("list_user_types"), 1);
        assert_eq!(access.call_count("list_pages"), 1);
        assert_eq!(access.call_count("list_page_roles"), 1);
    }

    #[tokio::test]
    async fn create_group_posts_once_resets_the_form_and_reloads_silently() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(FakeAccessControlApi::default());
        let controller =
            AdminPanelController::new(access.clone(), anonymous_auth(dir.path(), access.clone()));
        controller.load(false).await;

        controller.update_group_form(|form| {
            form.name = "Ops".to_string();
            form.is_active = true;
        });
        controller.create_group().await;

        let state = controller.state();
        assert_eq!(access.call_count("create_user_group"), 1);
        assert_eq!(state.group_form.name, "");
        assert_eq!(state.status_message.as_deref(), Some("Group created."));
        assert!(state.error_message.is_none());
        // The post-mutation reload is silent: the loading flag never came back.
        assert!(!state.is_loading);
        assert_eq!(access.call_count("list_user_groups"), 2);
        assert_eq!(state.user_groups.len(), 1);
        assert!(!controller.is_busy("create-group"));
    }

    #[tokio::test]
    async fn create_group_failure_surfaces_the_server_message() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(FakeAccessControlApi::default());
        let controller =
            AdminPanelController::new(access.clone(), anonymous_auth(dir.path(), access.clone()));

        controller.update_group_form(|form| form.name = "Ops".to_string());
        access.fail_next(409, "group already exists");
        controller.create_group().await;

        let state = controller.state();
        assert_eq!(state.error_message.as_deref(), Some("group already exists"));
        assert!(state.status_message.is_none());
    }

    #[tokio::test]
    async fn incomplete_role_form_fails_locally_without_network_calls() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(FakeAccessControlApi::default());
        let controller =
            AdminPanelController::new(access.clone(), anonymous_auth(dir.path(), access.clone()));

        controller.update_role_form(|form| {
            form.user_type_id = "type-1".to_string();
            form.page_id = "page-1".to_string();
            form.role = "   ".to_string();
        });
        controller.create_role().await;

        let state = controller.state();
        assert_eq!(state.error_message.as_deref(), Some(ROLE_VALIDATION_ERROR));
        assert_eq!(access.total_calls(), 0);
    }

    #[tokio::test]
    async fn remove_role_uses_a_per_row_action_key() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(FakeAccessControlApi::default());
        access.page_roles.lock().unwrap().push(
            crate::common::models::PageRole {
                id: "r9".to_string(),
                role: "viewer".to_string(),
                page: None,
                user_type: None,
            },
        );
        let controller =
            AdminPanelController::new(access.clone(), anonymous_auth(dir.path(), access.clone()));

        controller.remove_role("r9").await;
        let state = controller.state();
        assert_eq!(access.call_count("delete_page_role"), 1);
        assert_eq!(state.status_message.as_deref(), Some("Role removed."));
        assert!(!controller.is_busy("delete-role-r9"));
    }

    #[tokio::test]
    async fn changing_own_user_type_refreshes_the_session_profile() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(FakeAccessControlApi::default());
        access
            .profiles
            .lock()
            .unwrap()
            .push(sample_profile("me", &["dashboard.access"]));
        let auth = auth_with_identity(dir.path(), access.clone(), "me").await;
        let controller = AdminPanelController::new(access.clone(), auth);
        controller.load(false).await;

        controller
            .change_profile_user_type("me", Some("type-me".to_string()))
            .await;

        assert_eq!(access.call_count("update_profile_user_type"), 1);
        assert_eq!(access.call_count("get_profile"), 1);
        assert_eq!(
            controller.state().status_message.as_deref(),
            Some("Profile updated.")
        );
    }

    #[tokio::test]
    async fn changing_someone_elses_user_type_does_not_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(FakeAccessControlApi::default());
        access
            .profiles
            .lock()
            .unwrap()
            .push(sample_profile("me", &[]));
        access
            .profiles
            .lock()
            .unwrap()
            .push(sample_profile("other", &[]));
        let auth = auth_with_identity(dir.path(), access.clone(), "me").await;
        let controller = AdminPanelController::new(access.clone(), auth);

        controller
            .change_profile_user_type("other", None)
            .await;

        assert_eq!(access.call_count("update_profile_user_type"), 1);
        assert_eq!(access.call_count("get_profile"), 0);
    }
}
