//! Process-wide login session.
//!
//! The session is created from storage at startup and changes only through
//! [`Session::set`], [`Session::clear`] and [`Session::clear_if`]. Reads are synchronous and always see
//! either the old or the new token, never a partial write.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::storage::{KeyValueStore, MemoryStore};

/// Storage slot holding the bearer token.
pub const SESSION_KEY: &str = "authToken";

pub struct Session {
    token: RwLock<Option<String>>,
    store: Arc<dyn KeyValueStore>,
    // Orders persistence so storage ends in the same state as memory.
    writes: Mutex<()>,
}

impl Session {
    /// Restore whatever session the store holds.
    pub async fn open(store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let token = store
            .get(SESSION_KEY)
            .await?
            .filter(|t| !t.trim().is_empty());
        if token.is_some() {
            info!("Restored existing session");
        }

        Ok(Self {
            token: RwLock::new(token),
            store,
            writes: Mutex::new(()),
        })
    }

    /// A session that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            token: RwLock::new(None),
            store: Arc::new(MemoryStore::new()),
            writes: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.token.read().is_some()
    }

    pub async fn set(&self, token: &str) -> anyhow::Result<()> {
        if token.trim().is_empty() {
            anyhow::bail!("refusing to store an empty session token");
        }

        let _guard = self.writes.lock().await;
        *self.token.write() = Some(token.to_string());
        self.store.put(SESSION_KEY, token).await?;
        info!("Session started");
        Ok(())
    }

    /// Drop the session. Returns `false` when there was nothing to clear, so
    /// a repeated logout is a no-op.
    pub async fn clear(&self) -> anyhow::Result<bool> {
        let _guard = self.writes.lock().await;
        let previous = self.token.write().take();
        match previous {
            Some(token) => self.forget(token).await,
            None => {
                debug!("Session already cleared");
                Ok(false)
            }
        }
    }

    /// Clear only if `expected` is still the current token. A newer session
    /// started in the meantime is left alone.
    pub async fn clear_if(&self, expected: &str) -> anyhow::Result<bool> {
        let _guard = self.writes.lock().await;
        let previous = {
            let mut token = self.token.write();
            if token.as_deref() != Some(expected) {
                debug!("Session changed since the request was sent, keeping it");
                return Ok(false);
            }
            token.take()
        };
        match previous {
            Some(token) => self.forget(token).await,
            None => Ok(false),
        }
    }

    // A failed delete puts the token back; memory and storage must agree.
    async fn forget(&self, token: String) -> anyhow::Result<bool> {
        if let Err(e) = self.store.remove(SESSION_KEY).await {
            *self.token.write() = Some(token);
            return Err(e);
        }
        info!("Session cleared");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[tokio::test]
    async fn test_set_then_current() {
        let session = Session::in_memory();
        for token in ["abc123", "x", "token with spaces", "ünïcødé"] {
            session.set(token).await.unwrap();
            assert_eq!(session.current().as_deref(), Some(token));
        }
    }

    #[tokio::test]
    async fn test_clear_then_current_is_absent() {
        let session = Session::in_memory();
        session.set("abc123").await.unwrap();
        session.clear().await.unwrap();
        assert_eq!(session.current(), None);
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_clear_is_effective_once() {
        let session = Session::in_memory();
        session.set("abc123").await.unwrap();

        let (first, second) = tokio::join!(session.clear(), session.clear());
        let cleared = [first.unwrap(), second.unwrap()];
        assert_eq!(cleared.iter().filter(|c| **c).count(), 1);
    }

    #[tokio::test]
    async fn test_clear_if_matching_token() {
        let session = Session::in_memory();
        session.set("old").await.unwrap();
        assert!(session.clear_if("old").await.unwrap());
        assert_eq!(session.current(), None);
        assert!(!session.clear_if("old").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_if_keeps_newer_session() {
        let session = Session::in_memory();
        session.set("fresh").await.unwrap();
        assert!(!session.clear_if("old").await.unwrap());
        assert_eq!(session.current().as_deref(), Some("fresh"));
    }

    struct BrokenDelete(MemoryStore);

    #[async_trait::async_trait]
    impl KeyValueStore for BrokenDelete {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.0.put(key, value).await
        }

        async fn remove(&self, _key: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk I/O error")
        }
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_token_in_memory() {
        let store = Arc::new(BrokenDelete(MemoryStore::with_entry(SESSION_KEY, "abc123")));
        let session = Session::open(store.clone()).await.unwrap();

        assert!(session.clear().await.is_err());
        assert_eq!(session.current().as_deref(), Some("abc123"));
        assert!(session.clear_if("abc123").await.is_err());
        assert_eq!(session.current().as_deref(), Some("abc123"));
        assert_eq!(store.get(SESSION_KEY).await.unwrap().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let session = Session::in_memory();
        assert!(session.set("").await.is_err());
        assert!(session.set("   ").await.is_err());
        assert_eq!(session.current(), None);
    }

    #[tokio::test]
    async fn test_open_restores_persisted_token() {
        let store = Arc::new(MemoryStore::with_entry(SESSION_KEY, "persisted"));
        let session = Session::open(store).await.unwrap();
        assert_eq!(session.current().as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn test_open_ignores_blank_token() {
        let store = Arc::new(MemoryStore::with_entry(SESSION_KEY, ""));
        let session = Session::open(store).await.unwrap();
        assert_eq!(session.current(), None);
    }

    #[tokio::test]
    async fn test_session_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite:{}?mode=rwc",
            temp_dir.path().join("session.db").display()
        );

        {
            let db = Database::new(&url).await.unwrap();
            db.initialize().await.unwrap();
            let session = Session::open(Arc::new(db)).await.unwrap();
            session.set("abc123").await.unwrap();
        }

        let db = Database::new(&url).await.unwrap();
        let session = Session::open(Arc::new(db)).await.unwrap();
        assert_eq!(session.current().as_deref(), Some("abc123"));

        session.clear().await.unwrap();
        let db = Database::new(&url).await.unwrap();
        let reopened = Session::open(Arc::new(db)).await.unwrap();
        assert_eq!(reopened.current(), None);
    }
}
