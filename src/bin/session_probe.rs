use std::sync::Arc;

use portale::client::services::access_control_api::HttpAccessControlApi;
use portale::client::services::auth_api::{HttpAuthApi, LoginPayload};
use portale::client::services::auth_manager::AuthSessionManager;
use portale::client::services::chat_api::{ChatApi, HttpChatApi};
use portale::client::services::http_client::HttpClient;
use portale::client::services::platform_auth::PlatformAuthClient;
use portale::client::utils::session_store::SessionStore;
use portale::config::AppConfig;

/// Headless session probe: hydrates (optionally logs in with PROBE_EMAIL /
/// PROBE_PASSWORD), then prints the session and the room list.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cfg = AppConfig::from_env()?;

    let store = Arc::new(SessionStore::new());
    let api_http = Arc::new(HttpClient::new(&cfg.api_base_url, true, store.clone()));
    let auth_http = Arc::new(HttpClient::new(&cfg.auth_base_url, false, store.clone()));

    let auth_api = Arc::new(HttpAuthApi::new(auth_http.clone()));
    let access = Arc::new(HttpAccessControlApi::new(
        auth_http,
        cfg.admin_api_key.clone(),
    ));
    let platform = Arc::new(PlatformAuthClient::new(
        cfg.platform_url.clone(),
        cfg.platform_anon_key.clone(),
    ));
    let chat = HttpChatApi::new(api_http, cfg.admin_api_key.clone());

    let sessions = AuthSessionManager::new(store, auth_api, access, platform);
    sessions.hydrate().await;

    if !sessions.snapshot().is_authenticated() {
        if let (Ok(email), Ok(password)) = (
            std::env::var("PROBE_EMAIL"),
            std::env::var("PROBE_PASSWORD"),
        ) {
            println!("No stored session, logging in as {}", email);
            sessions.login(&LoginPayload { email, password }).await?;
        }
    }

    let snapshot = sessions.snapshot();
    println!("authenticated: {}", snapshot.is_authenticated());
    if let Some(user) = &snapshot.user {
        println!(
            "user: {} <{}>",
            user.id,
            user.email.as_deref().unwrap_or("-")
        );
    }
    if let Some(profile) = &snapshot.profile {
        println!(
            "profile: {} (@{})",
            profile.display_name.as_deref().unwrap_or("-"),
            profile.handle.as_deref().unwrap_or("-")
        );
    }
    println!("accessible pages: {:?}", snapshot.accessible_page_keys);

    if snapshot.is_authenticated() {
        let rooms = chat.list_rooms().await?;
        println!("{} rooms", rooms.len());
        let me = snapshot.external_user_id();
        for room in &rooms {
            println!(
                "  {} [{}] last activity {}",
                room.display_name(me.as_deref()),
                room.id,
                room.activity_at()
            );
        }
    }

    Ok(())
}
