use std::env;

/// Client configuration loaded from the environment (a local `.env` file is
/// honoured when present). Platform URL, anon key and admin key have no sane
/// defaults and abort startup when absent.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the identity/realtime platform (http or https).
    pub platform_url: String,
    /// Anonymous API key attached to every platform call.
    pub platform_anon_key: String,
    /// Base URL of the general REST API (chat, math).
    pub api_base_url: String,
    /// Base URL of the auth/access-control REST API.
    pub auth_base_url: String,
    /// Broadcast channel carrying sample calculation events.
    pub realtime_channel: String,
    /// Static key attached to admin-scoped calls.
    pub admin_api_key: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| anyhow::anyhow!("missing required environment variable {}", key))
        };

        Ok(Self {
            platform_url: required("PLATFORM_URL")?,
            platform_anon_key: required("PLATFORM_ANON_KEY")?,
            api_base_url: get("API_BASE_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            auth_base_url: get("AUTH_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3001".to_string()),
            realtime_channel: get("REALTIME_CHANNEL").unwrap_or_else(|| "calculations".to_string()),
            admin_api_key: required("ADMIN_API_KEY")?,
        })
    }

    /// Websocket endpoint of the realtime platform, derived from the platform
    /// base URL (`http` → `ws`, `https` → `wss`).
    pub fn realtime_ws_url(&self) -> String {
        let base = self.platform_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/realtime/v1/websocket?apikey={}", ws_base, self.platform_anon_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("PLATFORM_URL", "https://platform.example.com"),
            ("PLATFORM_ANON_KEY", "anon-key"),
            ("ADMIN_API_KEY", "admin-key"),
        ])
    }

    fn lookup_in(vars: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn applies_defaults_for_optional_values() {
        let cfg = AppConfig::from_lookup(lookup_in(base_vars())).unwrap();
        assert_eq!(cfg.api_base_url, "http://localhost:3000");
        assert_eq!(cfg.auth_base_url, "http://localhost:3001");
        assert_eq!(cfg.realtime_channel, "calculations");
    }

    #[test]
    fn fails_fast_when_a_required_value_is_missing() {
        let mut vars = base_vars();
        vars.remove("PLATFORM_ANON_KEY");
        let err = AppConfig::from_lookup(lookup_in(vars)).unwrap_err();
        assert!(err.to_string().contains("PLATFORM_ANON_KEY"));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let mut vars = base_vars();
        vars.insert("ADMIN_API_KEY", "  ");
        assert!(AppConfig::from_lookup(lookup_in(vars)).is_err());
    }

    #[test]
    fn derives_the_websocket_url_from_the_platform_url() {
        let cfg = AppConfig::from_lookup(lookup_in(base_vars())).unwrap();
        assert_eq!(
            cfg.realtime_ws_url(),
            "wss://platform.example.com/realtime/v1/websocket?apikey=anon-key"
        );
    }
}
