//! Session continuity store.
//!
//! An in-memory map of [`SessionRecord`]s mirrored through a
//! [`SessionRepository`] on every mutation. All writes funnel through
//! [`SessionStore::with_record`], the single mutator path, so the
//! `reset_generation` compare stays race-free without per-field atomics.
//!
//! Callers are externally serialized per conversation key; the generation
//! guard exists for the one sanctioned violation of that rule — an explicit
//! user reset racing a call that was already dispatched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::store::record::{ConversationKey, SessionRecord};
use crate::store::repository::SessionRepository;
use crate::Result;

/// Continuity store: one record per conversation key, persisted on mutation.
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    cache: Mutex<HashMap<ConversationKey, SessionRecord>>,
}

impl SessionStore {
    /// Create a store over the given repository.
    #[must_use]
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            repo,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Current record for a key, created lazily on first access.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn load_or_create(&self, key: ConversationKey) -> Result<SessionRecord> {
        self.with_record(key, |record| record.clone()).await
    }

    /// Whether resuming the stored subprocess session is reliable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn is_resume_reliable(&self, key: ConversationKey, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        self.with_record(key, |record| record.is_resume_reliable(ttl, now))
            .await
    }

    /// Explicit reset: clear the session line and bump the generation.
    ///
    /// Returns the new generation. Idempotent in effect; each call still
    /// increments the counter so any in-flight callback goes stale.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn reset(&self, key: ConversationKey) -> Result<u64> {
        let now = Utc::now();
        let generation = self
            .with_record(key, |record| {
                record.apply_reset(now);
                record.reset_generation
            })
            .await?;
        info!(%key, generation, "session reset");
        Ok(generation)
    }

    /// Generation-guarded session id update.
    ///
    /// Applies only when `captured_generation` still matches the record;
    /// otherwise it is a silent no-op — expected steady-state behavior when a
    /// reset landed while the call was in flight, not a fault. Returns
    /// whether the update was applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn update_session_id_guarded(
        &self,
        key: ConversationKey,
        new_id: &str,
        captured_generation: u64,
    ) -> Result<bool> {
        self.with_record(key, |record| {
            if record.reset_generation != captured_generation {
                debug!(%key, captured_generation, current = record.reset_generation,
                    "stale session id update dropped");
                return false;
            }
            record.session_id = Some(new_id.to_owned());
            true
        })
        .await
    }

    /// Mark one completed engine call: bump the message count, stamp
    /// activity, and apply the reported session id under the generation
    /// guard.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn record_completed_call(
        &self,
        key: ConversationKey,
        captured_generation: u64,
        session_id: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        self.with_record(key, |record| {
            record.record_call(now);
            if record.reset_generation == captured_generation {
                if let Some(id) = session_id {
                    record.session_id = Some(id.to_owned());
                }
            }
        })
        .await
    }

    /// Lock the working directory for the next subprocess session and return
    /// the directory the engine should spawn in. While a session id is
    /// present the previously locked directory wins unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn lock_active_working_directory(
        &self,
        key: ConversationKey,
        fallback: &Path,
    ) -> Result<PathBuf> {
        self.with_record(key, |record| {
            record.lock_active_working_directory(fallback);
            record
                .active_working_directory
                .clone()
                .unwrap_or_else(|| fallback.to_path_buf())
        })
        .await
    }

    /// Set or clear the user-configured working directory. Takes effect at
    /// the next cold start; never changes the directory mid-session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn set_working_directory(
        &self,
        key: ConversationKey,
        dir: Option<PathBuf>,
    ) -> Result<()> {
        self.with_record(key, |record| record.working_directory = dir)
            .await
    }

    /// Queue a context injection for the next prompt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn mark_pending_context_injection(&self, key: ConversationKey) -> Result<()> {
        self.with_record(key, |record| record.pending_context_injection = true)
            .await
    }

    /// Decide whether the next prompt gets a context injection, consuming
    /// both the pending flag and any reset-time suppression.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on repository failure.
    pub async fn take_context_injection(&self, key: ConversationKey) -> Result<bool> {
        self.with_record(key, |record| {
            let inject = record.pending_context_injection && !record.suppress_context_injection;
            record.pending_context_injection = false;
            record.suppress_context_injection = false;
            inject
        })
        .await
    }

    /// Single mutator path: load (cache, then repository, then fresh),
    /// mutate, persist, return.
    async fn with_record<T>(
        &self,
        key: ConversationKey,
        mutate: impl FnOnce(&mut SessionRecord) -> T,
    ) -> Result<T> {
        let mut cache = self.cache.lock().await;
        if !cache.contains_key(&key) {
            let loaded = match self.repo.load(key).await? {
                Some(record) => record,
                None => SessionRecord::new(Utc::now()),
            };
            cache.insert(key, loaded);
        }
        // Present by construction; the closure never runs.
        let record = cache
            .entry(key)
            .or_insert_with(|| SessionRecord::new(Utc::now()));
        let out = mutate(record);
        self.repo.save(key, record).await?;
        Ok(out)
    }
}
