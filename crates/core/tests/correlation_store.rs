use std::time::Duration;

use relay_forward_core::{
    CorrelationStore, InMemoryCorrelationStore, SqliteCorrelationStore, correlation_key,
    resolve_message_id,
};
use sqlx::Row;
use sqlx::sqlite::SqliteConnectOptions;
use tempfile::TempDir;

#[tokio::test(start_paused = true)]
async fn entry_is_readable_until_ttl_then_absent() {
    let store = InMemoryCorrelationStore::new();
    store.put(-100123, 555, 42).await.unwrap();

    tokio::time::advance(Duration::from_secs(299)).await;
    assert_eq!(store.get(-100123, 555).await.unwrap(), Some(42));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(store.get(-100123, 555).await.unwrap(), None);
}

#[tokio::test]
async fn later_write_overwrites_same_key() {
    let store = InMemoryCorrelationStore::new();
    store.put(7, 10, 1).await.unwrap();
    store.put(7, 10, 2).await.unwrap();
    assert_eq!(store.get(7, 10).await.unwrap(), Some(2));
}

#[tokio::test]
async fn keys_are_independent_per_chat() {
    let store = InMemoryCorrelationStore::new();
    store.put(1, 10, 100).await.unwrap();
    store.put(2, 10, 200).await.unwrap();
    assert_eq!(store.get(1, 10).await.unwrap(), Some(100));
    assert_eq!(store.get(2, 10).await.unwrap(), Some(200));
    assert_eq!(store.get(3, 10).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_evicted_on_write() {
    let store = InMemoryCorrelationStore::with_ttl(Duration::from_secs(10));
    store.put(1, 10, 100).await.unwrap();
    store.put(1, 11, 101).await.unwrap();

    tokio::time::advance(Duration::from_secs(11)).await;
    store.put(1, 12, 102).await.unwrap();
    assert_eq!(store.entry_count().await, 1);
}

#[tokio::test]
async fn resolve_falls_back_to_candidate_and_is_idempotent() {
    let store = InMemoryCorrelationStore::new();

    assert_eq!(resolve_message_id(&store, 9, 123).await, 123);
    assert_eq!(resolve_message_id(&store, 9, 123).await, 123);

    store.put(9, 123, 77).await.unwrap();
    assert_eq!(resolve_message_id(&store, 9, 123).await, 77);
    assert_eq!(resolve_message_id(&store, 9, 123).await, 77);
}

#[tokio::test]
async fn sqlite_store_round_trips_and_expires() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("correlations.sqlite");

    let store = SqliteCorrelationStore::connect(&path, Duration::from_secs(300))
        .await
        .unwrap();
    store.put(-100123, 555, 42).await.unwrap();
    assert_eq!(store.get(-100123, 555).await.unwrap(), Some(42));
    assert_eq!(store.get(-100123, 556).await.unwrap(), None);

    // A zero TTL expires immediately.
    let short = SqliteCorrelationStore::connect(&path, Duration::from_secs(0))
        .await
        .unwrap();
    short.put(-100123, 777, 43).await.unwrap();
    assert_eq!(short.get(-100123, 777).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_store_uses_the_shared_key_format() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("correlations.sqlite");

    let store = SqliteCorrelationStore::connect(&path, Duration::from_secs(300))
        .await
        .unwrap();
    store.put(-100123, 555, 42).await.unwrap();

    // A prior instance sharing this database keys entries the same way.
    let pool = sqlx::SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path))
        .await
        .unwrap();
    let row = sqlx::query("SELECT key, original_id FROM correlations")
        .fetch_one(&pool)
        .await
        .unwrap();
    let key: String = row.try_get("key").unwrap();
    let original: String = row.try_get("original_id").unwrap();
    assert_eq!(key, correlation_key(-100123, 555));
    assert_eq!(key, "-100123_555");
    assert_eq!(original, "42");

    // And an entry written externally is readable through the store.
    sqlx::query("INSERT INTO correlations (key, original_id, expires_at) VALUES (?, ?, ?)")
        .bind("-100123_900")
        .bind("88")
        .bind(chrono::Utc::now().timestamp() + 300)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(store.get(-100123, 900).await.unwrap(), Some(88));
}
