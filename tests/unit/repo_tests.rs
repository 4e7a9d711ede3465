//! Repository round-trip tests against both backends.

use chrono::{TimeDelta, Utc};

use agent_relay::store::{
    ConversationKey, MemoryRepository, SessionRecord, SessionRepository, SqliteRepository,
};

fn sample_record() -> SessionRecord {
    let now = Utc::now();
    let mut record = SessionRecord::new(now);
    record.session_id = Some("sess-abc".to_owned());
    record.last_activity = Some(now);
    record.message_count = 7;
    record.reset_generation = 2;
    record.pending_context_injection = true;
    record.working_directory = Some("/srv/project".into());
    record.active_working_directory = Some("/srv/project".into());
    record
}

#[tokio::test]
async fn memory_repository_round_trips_records() {
    let repo = MemoryRepository::new();
    let key = ConversationKey::topic(42, 7);

    assert!(repo.load(key).await.unwrap().is_none());

    let record = sample_record();
    repo.save(key, &record).await.unwrap();

    let loaded = repo.load(key).await.unwrap().unwrap();
    assert_eq!(loaded.session_id, record.session_id);
    assert_eq!(loaded.message_count, 7);
    assert_eq!(loaded.reset_generation, 2);
}

#[tokio::test]
async fn memory_repository_save_replaces_existing() {
    let repo = MemoryRepository::new();
    let key = ConversationKey::chat(1);

    let mut record = sample_record();
    repo.save(key, &record).await.unwrap();
    record.message_count = 8;
    record.session_id = None;
    repo.save(key, &record).await.unwrap();

    let loaded = repo.load(key).await.unwrap().unwrap();
    assert_eq!(loaded.message_count, 8);
    assert_eq!(loaded.session_id, None);
    assert_eq!(repo.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_repository_round_trips_records() {
    let repo = SqliteRepository::in_memory().await.unwrap();
    let key = ConversationKey::topic(-100_500, 12);

    assert!(repo.load(key).await.unwrap().is_none());

    let record = sample_record();
    repo.save(key, &record).await.unwrap();

    let loaded = repo.load(key).await.unwrap().unwrap();
    assert_eq!(loaded.session_id.as_deref(), Some("sess-abc"));
    assert_eq!(loaded.message_count, 7);
    assert_eq!(loaded.reset_generation, 2);
    assert!(loaded.pending_context_injection);
    assert!(!loaded.suppress_context_injection);
    assert_eq!(
        loaded.working_directory.as_deref(),
        Some(std::path::Path::new("/srv/project"))
    );

    // Timestamps survive the rfc3339 round trip to sub-second precision.
    let saved = record.last_activity.unwrap();
    let restored = loaded.last_activity.unwrap();
    assert!((restored - saved).abs() < TimeDelta::milliseconds(1));
}

#[tokio::test]
async fn sqlite_repository_keys_chat_and_topic_separately() {
    let repo = SqliteRepository::in_memory().await.unwrap();
    let plain = ConversationKey::chat(5);
    let topical = ConversationKey::topic(5, 9);

    let mut record = sample_record();
    record.session_id = Some("plain".to_owned());
    repo.save(plain, &record).await.unwrap();
    record.session_id = Some("topical".to_owned());
    repo.save(topical, &record).await.unwrap();

    assert_eq!(
        repo.load(plain).await.unwrap().unwrap().session_id.as_deref(),
        Some("plain")
    );
    assert_eq!(
        repo.load(topical)
            .await
            .unwrap()
            .unwrap()
            .session_id
            .as_deref(),
        Some("topical")
    );

    let mut listed = repo.list().await.unwrap();
    listed.sort_by_key(|(key, _)| (key.chat_id, key.topic_id));
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].0, plain);
    assert_eq!(listed[1].0, topical);
}

#[tokio::test]
async fn sqlite_repository_tolerates_malformed_last_activity() {
    let repo = SqliteRepository::in_memory().await.unwrap();
    let key = ConversationKey::chat(77);
    repo.save(key, &sample_record()).await.unwrap();

    sqlx::query("UPDATE session_record SET last_activity = 'not-a-timestamp'")
        .execute(repo.pool())
        .await
        .unwrap();

    let loaded = repo.load(key).await.unwrap().unwrap();
    assert_eq!(loaded.last_activity, None);
}
