//! Session persistence interface.
//!
//! The store keeps session text *outside* the lifetime of live
//! connections: the gateway reads it once to seed a session on first
//! attach and writes it back best-effort when a session empties. It is
//! never the source of truth while a session is active.
//!
//! [`MemoryStore`] is the reference implementation used by tests and the
//! bundled server binary; a durable backend implements the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A session as the store knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub name: String,
    pub code: String,
}

/// Store backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persistence of session text outside the live connection's lifetime.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new stored session with empty text, returning its id.
    async fn create(&self, name: &str) -> Result<String, StoreError>;

    /// Fetch a stored session. `Ok(None)` when the id is unknown.
    async fn get(&self, session_id: &str) -> Result<Option<StoredSession>, StoreError>;

    /// All stored sessions.
    async fn list(&self) -> Result<Vec<(String, StoredSession)>, StoreError>;

    /// Delete a stored session. No-op when the id is unknown.
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    /// Write the session's text. Creates the entry when absent, since a
    /// live session may never have been stored explicitly.
    async fn save(&self, session_id: &str, code: &str) -> Result<(), StoreError>;
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, name: &str) -> Result<String, StoreError> {
        let session_id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session_id.clone(),
            StoredSession {
                name: name.to_string(),
                code: String::new(),
            },
        );
        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<StoredSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn list(&self) -> Result<Vec<(String, StoredSession)>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn save(&self, session_id: &str, code: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| StoredSession {
                name: String::new(),
                code: String::new(),
            });
        entry.code = code.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let id = store.create("my session").await.unwrap();

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.name, "my session");
        assert_eq!(stored.code, "");
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_code() {
        let store = MemoryStore::new();
        let id = store.create("s").await.unwrap();

        store.save(&id, "v1").await.unwrap();
        store.save(&id, "v2").await.unwrap();

        assert_eq!(store.get(&id).await.unwrap().unwrap().code, "v2");
    }

    #[tokio::test]
    async fn test_save_creates_missing_entry() {
        let store = MemoryStore::new();
        store.save("adhoc", "x = 1").await.unwrap();
        assert_eq!(store.get("adhoc").await.unwrap().unwrap().code, "x = 1");
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = MemoryStore::new();
        let a = store.create("a").await.unwrap();
        let b = store.create("b").await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);

        store.delete(&a).await.unwrap();
        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, b);

        // Deleting twice is a no-op.
        store.delete(&a).await.unwrap();
    }
}
