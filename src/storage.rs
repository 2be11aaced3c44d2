use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// Durable key/value storage for client-side state.
///
/// Absence of a key is the normal "nothing stored" answer, not an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS client_storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM client_storage WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO client_storage (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM client_storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Non-persistent store, for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.entries.lock().insert(key.to_string(), value.to_string());
        store
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_db() -> Database {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        db
    }

    mod initialization_tests {
        use super::*;

        #[tokio::test]
        async fn test_database_creation() {
            let db = Database::new("sqlite::memory:").await;
            assert!(db.is_ok());
        }

        #[tokio::test]
        async fn test_fresh_database_is_empty() {
            let db = create_test_db().await;
            assert_eq!(db.get("authToken").await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_double_initialization_is_safe() {
            let db = create_test_db().await;
            let result = db.initialize().await;
            assert!(result.is_ok());
        }
    }

    mod sqlite_store_tests {
        use super::*;

        #[tokio::test]
        async fn test_put_then_get() {
            let db = create_test_db().await;
            db.put("authToken", "abc123").await.unwrap();
            assert_eq!(db.get("authToken").await.unwrap(), Some("abc123".to_string()));
        }

        #[tokio::test]
        async fn test_put_overwrites() {
            let db = create_test_db().await;
            db.put("authToken", "first").await.unwrap();
            db.put("authToken", "second").await.unwrap();
            assert_eq!(db.get("authToken").await.unwrap(), Some("second".to_string()));

            let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM client_storage")
                .fetch_one(&db.pool)
                .await
                .unwrap();
            assert_eq!(count.0, 1);
        }

        #[tokio::test]
        async fn test_remove() {
            let db = create_test_db().await;
            db.put("authToken", "abc123").await.unwrap();
            db.remove("authToken").await.unwrap();
            assert_eq!(db.get("authToken").await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_remove_missing_key_is_ok() {
            let db = create_test_db().await;
            assert!(db.remove("authToken").await.is_ok());
        }

        #[tokio::test]
        async fn test_keys_are_independent() {
            let db = create_test_db().await;
            db.put("authToken", "abc123").await.unwrap();
            db.put("other", "value").await.unwrap();
            db.remove("other").await.unwrap();
            assert_eq!(db.get("authToken").await.unwrap(), Some("abc123".to_string()));
        }
    }

    mod memory_store_tests {
        use super::*;

        #[tokio::test]
        async fn test_with_entry() {
            let store = MemoryStore::with_entry("authToken", "abc123");
            assert_eq!(store.get("authToken").await.unwrap(), Some("abc123".to_string()));
        }

        #[tokio::test]
        async fn test_put_and_remove() {
            let store = MemoryStore::new();
            store.put("authToken", "t").await.unwrap();
            store.remove("authToken").await.unwrap();
            assert_eq!(store.get("authToken").await.unwrap(), None);
        }
    }
}
