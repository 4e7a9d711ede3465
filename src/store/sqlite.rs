//! `SQLite` repository for session records.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::store::record::{ConversationKey, SessionRecord};
use crate::store::repository::SessionRepository;
use crate::{AppError, Result};

/// Table definition; `IF NOT EXISTS` keeps it safe to re-run on every startup.
const DDL: &str = r"
CREATE TABLE IF NOT EXISTS session_record (
    conversation_key            TEXT PRIMARY KEY NOT NULL,
    chat_id                     INTEGER NOT NULL,
    topic_id                    INTEGER,
    session_id                  TEXT,
    last_activity               TEXT,
    message_count               INTEGER NOT NULL DEFAULT 0,
    started_at                  TEXT NOT NULL,
    reset_generation            INTEGER NOT NULL DEFAULT 0,
    pending_context_injection   INTEGER NOT NULL DEFAULT 0,
    suppress_context_injection  INTEGER NOT NULL DEFAULT 0,
    working_directory           TEXT,
    active_working_directory    TEXT
);
";

/// Repository wrapper around a `SQLite` pool for session records.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (creating if missing) a database file and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the pool cannot be opened or the schema
    /// cannot be applied.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| AppError::Store(format!("failed to create db dir: {err}")))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::query(DDL).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests; a single connection keeps one shared
    /// memory instance alive.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the pool cannot be opened.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query(DDL).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Underlying pool, for ad-hoc queries.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct RecordRow {
    chat_id: i64,
    topic_id: Option<i64>,
    session_id: Option<String>,
    last_activity: Option<String>,
    message_count: i64,
    started_at: String,
    reset_generation: i64,
    pending_context_injection: bool,
    suppress_context_injection: bool,
    working_directory: Option<String>,
    active_working_directory: Option<String>,
}

impl RecordRow {
    /// Convert a database row into the domain model.
    ///
    /// `last_activity` parses leniently; a malformed value becomes `None`
    /// and the resume decision fails closed.
    fn into_keyed_record(self) -> Result<(ConversationKey, SessionRecord)> {
        let key = ConversationKey {
            chat_id: self.chat_id,
            topic_id: self.topic_id,
        };
        let started_at = DateTime::parse_from_rfc3339(&self.started_at)
            .map_err(|err| AppError::Store(format!("invalid started_at: {err}")))?
            .with_timezone(&Utc);
        let last_activity = self
            .last_activity
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let record = SessionRecord {
            session_id: self.session_id,
            last_activity,
            message_count: u64::try_from(self.message_count).unwrap_or(0),
            started_at,
            reset_generation: u64::try_from(self.reset_generation).unwrap_or(0),
            pending_context_injection: self.pending_context_injection,
            suppress_context_injection: self.suppress_context_injection,
            working_directory: self.working_directory.map(Into::into),
            active_working_directory: self.active_working_directory.map(Into::into),
        };
        Ok((key, record))
    }
}

#[async_trait]
impl SessionRepository for SqliteRepository {
    async fn load(&self, key: ConversationKey) -> Result<Option<SessionRecord>> {
        let row: Option<RecordRow> =
            sqlx::query_as("SELECT * FROM session_record WHERE conversation_key = ?1")
                .bind(key.storage_key())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|row| row.into_keyed_record().map(|(_, record)| record))
            .transpose()
    }

    async fn save(&self, key: ConversationKey, record: &SessionRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO session_record (conversation_key, chat_id, topic_id,
             session_id, last_activity, message_count, started_at, reset_generation,
             pending_context_injection, suppress_context_injection,
             working_directory, active_working_directory)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(key.storage_key())
        .bind(key.chat_id)
        .bind(key.topic_id)
        .bind(&record.session_id)
        .bind(record.last_activity.map(|dt| dt.to_rfc3339()))
        .bind(i64::try_from(record.message_count).unwrap_or(i64::MAX))
        .bind(record.started_at.to_rfc3339())
        .bind(i64::try_from(record.reset_generation).unwrap_or(i64::MAX))
        .bind(record.pending_context_injection)
        .bind(record.suppress_context_injection)
        .bind(
            record
                .working_directory
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(
            record
                .active_working_directory
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(ConversationKey, SessionRecord)>> {
        let rows: Vec<RecordRow> = sqlx::query_as("SELECT * FROM session_record")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RecordRow::into_keyed_record).collect()
    }
}
