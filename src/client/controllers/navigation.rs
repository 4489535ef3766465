use crate::client::services::auth_manager::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavVisibility {
    All,
    Authenticated,
    Guests,
}

#[derive(Debug, Clone)]
pub struct NavItem {
    pub id: &'static str,
    pub label: &'static str,
    pub path: &'static str,
    pub visibility: NavVisibility,
    pub page_key: Option<&'static str>,
}

pub const NAV_ITEMS: &[NavItem] = &[
    NavItem {
        id: "dashboard",
        label: "Dashboard",
        path: "/",
        visibility: NavVisibility::Authenticated,
        page_key: Some("dashboard.home"),
    },
    NavItem {
        id: "chat",
        label: "Chat",
        path: "/chat",
        visibility: NavVisibility::Authenticated,
        page_key: Some("dashboard.chat"),
    },
    NavItem {
        id: "access-control",
        label: "Access control",
        path: "/access",
        visibility: NavVisibility::Authenticated,
        page_key: Some("dashboard.access"),
    },
    NavItem {
        id: "login",
        label: "Login",
        path: "/login",
        visibility: NavVisibility::Guests,
        page_key: None,
    },
    NavItem {
        id: "register",
        label: "Register",
        path: "/register",
        visibility: NavVisibility::Guests,
        page_key: None,
    },
];

fn matches_visibility(visibility: NavVisibility, is_authenticated: bool) -> bool {
    match visibility {
        NavVisibility::All => true,
        NavVisibility::Authenticated => is_authenticated,
        NavVisibility::Guests => !is_authenticated,
    }
}

/// Items the current session may see: visibility first, then the page-key
/// predicate for authenticated entries that carry one.
pub fn visible_items(snapshot: &SessionSnapshot) -> Vec<&'static NavItem> {
    NAV_ITEMS
        .iter()
        .filter(|item| {
            if !matches_visibility(item.visibility, snapshot.is_authenticated()) {
                return false;
            }
            match item.page_key {
                Some(key) if snapshot.is_authenticated() => snapshot.can_access_page(key),
                _ => true,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Session still hydrating; render nothing yet.
    Loading,
    /// Anonymous session: go to the login page, remembering where we came
    /// from.
    RedirectToLogin { from: String },
    Allow,
}

/// Protected-route decision for a page-level navigation.
pub fn check_route(snapshot: &SessionSnapshot, path: &str) -> RouteDecision {
    if snapshot.is_initializing() {
        return RouteDecision::Loading;
    }
    if !snapshot.is_authenticated() {
        return RouteDecision::RedirectToLogin {
            from: path.to_string(),
        };
    }
    RouteDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::auth_manager::SessionPhase;
    use crate::client::test_support::{sample_profile, sample_user};
    use crate::common::models::accessible_page_keys;

    fn anonymous_ready() -> SessionSnapshot {
        SessionSnapshot {
            phase: SessionPhase::Ready,
            ..SessionSnapshot::default()
        }
    }

    fn authenticated_with(keys: &[&str]) -> SessionSnapshot {
        let profile = sample_profile("me", keys);
        SessionSnapshot {
            token: Some("token".to_string()),
            user: Some(sample_user("me")),
            accessible_page_keys: accessible_page_keys(Some(&profile)),
            profile: Some(profile),
            phase: SessionPhase::Ready,
            is_processing: false,
        }
    }

    #[test]
    fn guests_see_only_guest_entries() {
        let items = visible_items(&anonymous_ready());
        let ids: Vec<_> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["login", "register"]);
    }

    #[test]
    fn authenticated_items_are_gated_by_page_key() {
        let items = visible_items(&authenticated_with(&["dashboard.home"]));
        let ids: Vec<_> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["dashboard"]);

        let items = visible_items(&authenticated_with(&["dashboard.home", "dashboard.chat"]));
        let ids: Vec<_> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["dashboard", "chat"]);
    }

    #[test]
    fn route_decisions_follow_the_session_phase() {
        let initializing = SessionSnapshot::default();
        assert_eq!(check_route(&initializing, "/chat"), RouteDecision::Loading);

        assert_eq!(
            check_route(&anonymous_ready(), "/chat"),
            RouteDecision::RedirectToLogin {
                from: "/chat".to_string()
            }
        );

        assert_eq!(
            check_route(&authenticated_with(&[]), "/chat"),
            RouteDecision::Allow
        );
    }
}
