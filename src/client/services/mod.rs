pub mod access_control_api;
pub mod auth_api;
pub mod auth_manager;
pub mod chat_api;
pub mod http_client;
pub mod math_api;
pub mod platform_auth;
pub mod realtime;
