//! Session continuity record and its pure predicates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifies one independent conversation line: a chat plus an optional
/// sub-topic within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// Chat identifier.
    pub chat_id: i64,
    /// Optional sub-topic within the chat.
    pub topic_id: Option<i64>,
}

impl ConversationKey {
    /// Key for a plain chat without sub-topics.
    #[must_use]
    pub fn chat(chat_id: i64) -> Self {
        Self {
            chat_id,
            topic_id: None,
        }
    }

    /// Key for a sub-topic within a chat.
    #[must_use]
    pub fn topic(chat_id: i64, topic_id: i64) -> Self {
        Self {
            chat_id,
            topic_id: Some(topic_id),
        }
    }

    /// Stable textual rendering used as the persistence key.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self.topic_id {
            Some(topic) => format!("{}:{topic}", self.chat_id),
            None => self.chat_id.to_string(),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// One session continuity record per conversation key.
///
/// Created lazily on first access, mutated by every completed engine call and
/// by explicit reset, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    /// Subprocess-assigned conversation handle; `None` until the first
    /// successful call after creation or reset.
    pub session_id: Option<String>,
    /// When the last engine call for this key completed. Malformed values in
    /// storage deserialize to `None`, which makes resume unreliable: the
    /// decision fails closed, never open.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_activity: Option<DateTime<Utc>>,
    /// Completed calls since the session started.
    pub message_count: u64,
    /// When this session line started (creation or last reset).
    pub started_at: DateTime<Utc>,
    /// Monotonic generation counter, incremented only by explicit reset.
    /// Guards in-flight callbacks against resets that happened after they
    /// were dispatched.
    pub reset_generation: u64,
    /// A context injection is queued for the next prompt.
    pub pending_context_injection: bool,
    /// Context injection is suppressed for the next prompt (set by reset).
    pub suppress_context_injection: bool,
    /// User-configured working directory, if any.
    pub working_directory: Option<PathBuf>,
    /// Working directory locked for the lifetime of the current subprocess
    /// session. Set exactly once at the cold-to-active transition, cleared
    /// only by reset, so resumed subprocesses always see the directory they
    /// were spawned with.
    pub active_working_directory: Option<PathBuf>,
}

impl SessionRecord {
    /// Fresh record for a key seen for the first time.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            session_id: None,
            last_activity: None,
            message_count: 0,
            started_at: now,
            reset_generation: 0,
            pending_context_injection: false,
            suppress_context_injection: false,
            working_directory: None,
            active_working_directory: None,
        }
    }

    /// Whether resuming the stored subprocess session is reliable.
    ///
    /// True iff a session id is present and the last activity is strictly
    /// inside the TTL window. Missing or malformed activity fails closed.
    #[must_use]
    pub fn is_resume_reliable(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if self.session_id.is_none() {
            return false;
        }
        let Some(last) = self.last_activity else {
            return false;
        };
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        now.signed_duration_since(last) < ttl
    }

    /// Apply the explicit-reset contract.
    ///
    /// Idempotent in effect, but every call still increments the generation
    /// so any in-flight callback captured before it becomes stale.
    pub fn apply_reset(&mut self, now: DateTime<Utc>) {
        self.session_id = None;
        self.message_count = 0;
        self.started_at = now;
        self.last_activity = Some(now);
        self.suppress_context_injection = true;
        self.pending_context_injection = false;
        self.active_working_directory = None;
        self.reset_generation += 1;
    }

    /// Mark one completed engine call.
    pub fn record_call(&mut self, now: DateTime<Utc>) {
        self.message_count += 1;
        self.last_activity = Some(now);
    }

    /// Lock the working directory for the lifetime of the next subprocess
    /// session. No-op while a session id is present: the directory never
    /// changes mid-session.
    pub fn lock_active_working_directory(&mut self, fallback: &Path) {
        if self.session_id.is_some() {
            return;
        }
        let dir = self
            .working_directory
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf());
        self.active_working_directory = Some(dir);
    }
}

/// Silent-resume-failure detection.
///
/// The subprocess gives no explicit signal when `--resume` is ignored and a
/// fresh session starts instead; the only evidence is a different session id
/// coming back from a call that attempted a resume.
#[must_use]
pub fn did_resume_fail(tried_resume: bool, prev_id: Option<&str>, new_id: Option<&str>) -> bool {
    match (tried_resume, prev_id, new_id) {
        (true, Some(prev), Some(new)) => prev != new,
        _ => false,
    }
}

fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)
        .ok()
        .flatten()
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}
