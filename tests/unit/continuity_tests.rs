//! Unit tests for the continuity store: generation guard, directory
//! locking, and context-injection flags.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_relay::store::{ConversationKey, MemoryRepository, SessionRepository, SessionStore};

fn store() -> SessionStore {
    SessionStore::new(Arc::new(MemoryRepository::new()))
}

#[tokio::test]
async fn records_are_created_lazily() {
    let store = store();
    let key = ConversationKey::chat(100);

    let record = store.load_or_create(key).await.unwrap();
    assert_eq!(record.session_id, None);
    assert_eq!(record.reset_generation, 0);
    assert_eq!(record.message_count, 0);
}

#[tokio::test]
async fn guarded_update_applies_with_current_generation() {
    let store = store();
    let key = ConversationKey::chat(1);

    let generation = store.load_or_create(key).await.unwrap().reset_generation;
    let applied = store
        .update_session_id_guarded(key, "sess-1", generation)
        .await
        .unwrap();

    assert!(applied);
    let record = store.load_or_create(key).await.unwrap();
    assert_eq!(record.session_id.as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn guarded_update_is_a_silent_no_op_after_reset() {
    let store = store();
    let key = ConversationKey::chat(2);

    // Generation captured before dispatch…
    let stale = store.load_or_create(key).await.unwrap().reset_generation;

    // …then the user resets mid-call.
    store.reset(key).await.unwrap();

    let applied = store
        .update_session_id_guarded(key, "sess-old", stale)
        .await
        .unwrap();
    assert!(!applied);
    let record = store.load_or_create(key).await.unwrap();
    assert_eq!(record.session_id, None, "stale callback must not resurrect the old session");
}

#[tokio::test]
async fn reset_increments_generation_every_call() {
    let store = store();
    let key = ConversationKey::topic(3, 14);

    assert_eq!(store.reset(key).await.unwrap(), 1);
    assert_eq!(store.reset(key).await.unwrap(), 2);
    assert_eq!(store.reset(key).await.unwrap(), 3);
}

#[tokio::test]
async fn completed_call_updates_activity_and_guarded_id() {
    let store = store();
    let key = ConversationKey::chat(4);

    let generation = store.load_or_create(key).await.unwrap().reset_generation;
    store
        .record_completed_call(key, generation, Some("sess-9"))
        .await
        .unwrap();

    let record = store.load_or_create(key).await.unwrap();
    assert_eq!(record.message_count, 1);
    assert_eq!(record.session_id.as_deref(), Some("sess-9"));
    assert!(record.last_activity.is_some());
    assert!(store
        .is_resume_reliable(key, Duration::from_secs(60))
        .await
        .unwrap());
}

#[tokio::test]
async fn completed_call_after_reset_keeps_activity_but_drops_stale_id() {
    let store = store();
    let key = ConversationKey::chat(5);

    let stale = store.load_or_create(key).await.unwrap().reset_generation;
    store.reset(key).await.unwrap();

    store
        .record_completed_call(key, stale, Some("sess-old"))
        .await
        .unwrap();

    let record = store.load_or_create(key).await.unwrap();
    assert_eq!(record.session_id, None);
    assert_eq!(record.message_count, 1);
}

#[tokio::test]
async fn working_directory_locks_once_per_session_line() {
    let store = store();
    let key = ConversationKey::chat(6);
    let generation = store.load_or_create(key).await.unwrap().reset_generation;

    let dir = store
        .lock_active_working_directory(key, Path::new("/fallback"))
        .await
        .unwrap();
    assert_eq!(dir, Path::new("/fallback"));

    store
        .update_session_id_guarded(key, "sess-1", generation)
        .await
        .unwrap();
    store
        .set_working_directory(key, Some("/elsewhere".into()))
        .await
        .unwrap();

    // Mid-session the locked directory wins; the new preference waits for
    // the next reset.
    let dir = store
        .lock_active_working_directory(key, Path::new("/fallback"))
        .await
        .unwrap();
    assert_eq!(dir, Path::new("/fallback"));

    store.reset(key).await.unwrap();
    let dir = store
        .lock_active_working_directory(key, Path::new("/fallback"))
        .await
        .unwrap();
    assert_eq!(dir, Path::new("/elsewhere"));
}

#[tokio::test]
async fn reset_suppresses_the_next_context_injection() {
    let store = store();
    let key = ConversationKey::chat(7);

    store.mark_pending_context_injection(key).await.unwrap();
    store.reset(key).await.unwrap();
    assert!(!store.take_context_injection(key).await.unwrap());

    // Suppression is consumed; a fresh pending flag injects normally.
    store.mark_pending_context_injection(key).await.unwrap();
    assert!(store.take_context_injection(key).await.unwrap());
    assert!(!store.take_context_injection(key).await.unwrap());
}

#[tokio::test]
async fn records_survive_a_store_restart_via_the_repository() {
    let repo: Arc<dyn SessionRepository> = Arc::new(MemoryRepository::new());
    let key = ConversationKey::chat(8);

    let store = SessionStore::new(Arc::clone(&repo));
    let generation = store.load_or_create(key).await.unwrap().reset_generation;
    store
        .record_completed_call(key, generation, Some("sess-live"))
        .await
        .unwrap();
    drop(store);

    let reopened = SessionStore::new(repo);
    let record = reopened.load_or_create(key).await.unwrap();
    assert_eq!(record.session_id.as_deref(), Some("sess-live"));
    assert_eq!(record.message_count, 1);
}
