//! Swappable persistence behind the session store.
//!
//! The continuity logic never talks to a database directly; it goes through
//! [`SessionRepository`] so production can run on SQLite while tests run on
//! the in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::record::{ConversationKey, SessionRecord};
use crate::Result;

/// Durable load/save round trip for session records, keyed by conversation.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Load the record for a key, if one was ever saved.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the backing storage fails.
    async fn load(&self, key: ConversationKey) -> Result<Option<SessionRecord>>;

    /// Save (insert or replace) the record for a key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the backing storage fails.
    async fn save(&self, key: ConversationKey, record: &SessionRecord) -> Result<()>;

    /// List every persisted record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the backing storage fails.
    async fn list(&self) -> Result<Vec<(ConversationKey, SessionRecord)>>;
}

/// In-memory repository: records live as long as the process.
#[derive(Default)]
pub struct MemoryRepository {
    records: Mutex<HashMap<ConversationKey, SessionRecord>>,
}

impl MemoryRepository {
    /// Create an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning the trait-object form.
    #[must_use]
    pub fn shared() -> Arc<dyn SessionRepository> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn load(&self, key: ConversationKey) -> Result<Option<SessionRecord>> {
        Ok(self.records.lock().await.get(&key).cloned())
    }

    async fn save(&self, key: ConversationKey, record: &SessionRecord) -> Result<()> {
        self.records.lock().await.insert(key, record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(ConversationKey, SessionRecord)>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .map(|(key, record)| (*key, record.clone()))
            .collect())
    }
}
