//! Auth token storage and resolution.
//!
//! Mirrors the app's device key-value storage: the token may live inside a
//! `user` JSON blob or under bare `token`/`authToken` keys. Resolution walks
//! those in order and ignores empty values. Finding nothing is not an error;
//! the client then sends the request unauthenticated for the server's
//! bypass/review path.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage key holding the logged-in user as a JSON blob.
pub const USER_KEY: &str = "user";
/// Storage key holding a bare token.
pub const TOKEN_KEY: &str = "token";
/// Legacy storage key holding a bare token.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Key-value storage the app keeps its session material in.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch the raw value stored under `key`.
    async fn get(&self, key: &str) -> Option<String>;
}

/// Resolve the auth token from a store.
///
/// Precedence: `user` blob's `token` field, then `token`, then `authToken`.
pub async fn resolve_token(store: &dyn TokenStore) -> Option<String> {
    if let Some(blob) = store.get(USER_KEY).await {
        match serde_json::from_str::<Value>(&blob) {
            Ok(user) => {
                if let Some(token) = user.get("token").and_then(|v| v.as_str()) {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
            Err(e) => debug!("stored user blob is not JSON: {}", e),
        }
    }

    for key in [TOKEN_KEY, AUTH_TOKEN_KEY] {
        if let Some(token) = store.get(key).await {
            if !token.is_empty() {
                return Some(token);
            }
        }
    }

    None
}

/// In-memory store for embedding and tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: &str, value: &str) {
        self.values.write().await.insert(key.to_string(), value.to_string());
    }

    pub async fn remove(&self, key: &str) {
        self.values.write().await.remove(key);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }
}

/// Store backed by a single JSON object on disk, read on every lookup so
/// out-of-band edits (a login from another process) are picked up.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Option<HashMap<String, String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("token file {:?} not readable: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(values) => Some(values),
            Err(e) => {
                debug!("token file {:?} is not a JSON object of strings: {}", self.path, e);
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut values = self.read_all().unwrap_or_default();
        values.insert(key.to_string(), value.to_string());
        fs::write(&self.path, serde_json::to_string_pretty(&values)?)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut values = self.read_all().unwrap_or_default();
        if values.remove(key).is_some() {
            fs::write(&self.path, serde_json::to_string_pretty(&values)?)?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.read_all()?.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_blob_wins_over_bare_keys() {
        let store = MemoryTokenStore::new();
        store.set(USER_KEY, r#"{"username":"ada","token":"from-user"}"#).await;
        store.set(TOKEN_KEY, "from-token").await;
        store.set(AUTH_TOKEN_KEY, "from-auth-token").await;

        assert_eq!(resolve_token(&store).await.as_deref(), Some("from-user"));
    }

    #[tokio::test]
    async fn bare_token_wins_over_legacy_key() {
        let store = MemoryTokenStore::new();
        store.set(TOKEN_KEY, "from-token").await;
        store.set(AUTH_TOKEN_KEY, "from-auth-token").await;

        assert_eq!(resolve_token(&store).await.as_deref(), Some("from-token"));
    }

    #[tokio::test]
    async fn empty_and_malformed_values_fall_through() {
        let store = MemoryTokenStore::new();
        store.set(USER_KEY, "not json at all").await;
        store.set(TOKEN_KEY, "").await;
        store.set(AUTH_TOKEN_KEY, "last-resort").await;

        assert_eq!(resolve_token(&store).await.as_deref(), Some("last-resort"));
    }

    #[tokio::test]
    async fn empty_store_resolves_nothing() {
        let store = MemoryTokenStore::new();
        assert_eq!(resolve_token(&store).await, None);
    }

    #[tokio::test]
    async fn file_store_round_trips_and_survives_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        assert_eq!(store.get(TOKEN_KEY).await, None);

        store.set(TOKEN_KEY, "abc123").expect("set");
        store.set(USER_KEY, r#"{"token":"blob-token"}"#).expect("set");
        assert_eq!(store.get(TOKEN_KEY).await.as_deref(), Some("abc123"));
        assert_eq!(resolve_token(&store).await.as_deref(), Some("blob-token"));

        store.remove(USER_KEY).expect("remove");
        assert_eq!(resolve_token(&store).await.as_deref(), Some("abc123"));
    }
}
