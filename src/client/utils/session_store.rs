use std::path::PathBuf;

use keyring::Entry;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::services::http_client::BearerTokenSource;
use crate::common::models::{AuthUser, Profile};

const SERVICE: &str = "portale";
const TOKEN_KEY: &str = "auth.access_token";
const USER_KEY: &str = "auth.user";
const PROFILE_KEY: &str = "auth.profile";

/// Persisted session slots. Absence of any slot means "no session" for that
/// slot; callers decide what a usable session requires.
#[derive(Debug, Clone, Default)]
pub struct StoredSession {
    pub token: Option<String>,
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
}

enum Backend {
    /// OS keyring, with an optional file fallback when the keyring is
    /// unavailable. The fallback must be enabled explicitly via
    /// KEYRING_FALLBACK=true so tokens never land on disk silently.
    Keyring,
    /// Plain files under a caller-supplied directory. Used by tests and by
    /// hosts without a keychain.
    File(PathBuf),
}

pub struct SessionStore {
    backend: Backend,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            backend: Backend::Keyring,
        }
    }

    pub fn file_backed(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::File(dir.into()),
        }
    }

    pub fn load(&self) -> StoredSession {
        StoredSession {
            token: self.read(TOKEN_KEY).filter(|t| !t.trim().is_empty()),
            user: self.read_json(USER_KEY),
            profile: self.read_json(PROFILE_KEY),
        }
    }

    pub fn save(
        &self,
        token: &str,
        user: &AuthUser,
        profile: Option<&Profile>,
    ) -> anyhow::Result<()> {
        self.write(TOKEN_KEY, token)?;
        self.write_json(USER_KEY, user)?;
        match profile {
            Some(profile) => self.write_json(PROFILE_KEY, profile)?,
            None => self.remove(PROFILE_KEY),
        }
        Ok(())
    }

    pub fn clear(&self) {
        self.remove(TOKEN_KEY);
        self.remove(USER_KEY);
        self.remove(PROFILE_KEY);
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        // Corrupt entries are treated as absent, never as errors.
        self.read(key)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.write(key, &serde_json::to_string(value)?)
    }

    fn read(&self, key: &str) -> Option<String> {
        match &self.backend {
            Backend::Keyring => {
                let entry = Entry::new(SERVICE, key);
                match entry.get_password() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        if !fallback_enabled() {
                            return None;
                        }
                        let path = fallback_path(key);
                        std::fs::read_to_string(path).ok().filter(|v| !v.is_empty())
                    }
                }
            }
            Backend::File(dir) => std::fs::read_to_string(dir.join(key))
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }

    fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
        match &self.backend {
            Backend::Keyring => {
                let entry = Entry::new(SERVICE, key);
                match entry.set_password(value) {
                    Ok(()) => Ok(()),
                    Err(_) => {
                        if !fallback_enabled() {
                            return Err(anyhow::anyhow!(
                                "keyring unavailable and file fallback disabled"
                            ));
                        }
                        let path = fallback_path(key);
                        if let Some(parent) = path.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        std::fs::write(&path, value)?;
                        log::warn!(
                            "[SESSION_STORE] keyring unavailable, persisted {} to fallback file",
                            key
                        );
                        Ok(())
                    }
                }
            }
            Backend::File(dir) => {
                std::fs::create_dir_all(dir)?;
                std::fs::write(dir.join(key), value)?;
                Ok(())
            }
        }
    }

    fn remove(&self, key: &str) {
        match &self.backend {
            Backend::Keyring => {
                let entry = Entry::new(SERVICE, key);
                let _ = entry.delete_password();
                if fallback_enabled() {
                    let _ = std::fs::remove_file(fallback_path(key));
                }
            }
            Backend::File(dir) => {
                let _ = std::fs::remove_file(dir.join(key));
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BearerTokenSource for SessionStore {
    fn bearer_token(&self) -> Option<String> {
        self.read(TOKEN_KEY).filter(|t| !t.trim().is_empty())
    }
}

fn fallback_enabled() -> bool {
    std::env::var("KEYRING_FALLBACK").unwrap_or_default() == "true"
}

fn fallback_path(key: &str) -> PathBuf {
    std::path::Path::new("data").join(key)
}
