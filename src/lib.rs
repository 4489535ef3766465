//! Client core for the portale dashboard: session management with page-level
//! authorization, access-control administration, group/direct chat and
//! realtime notifications, backed by REST services and a pub/sub platform.

pub mod client;
pub mod common;
pub mod config;
