//! Track store tests
//!
//! Covers the persistence contract the playback service relies on:
//! - Tracks are keyed by canonical URL (upserts never duplicate rows)
//! - Name lookup is whitespace/case insensitive substring matching
//! - First stored match wins
//! - Stream URL refreshes are persisted in place

use musi_common::db::{open_in_memory, Platform, Track, TrackStore};

async fn create_store() -> TrackStore {
    TrackStore::new(open_in_memory().await.unwrap())
}

fn track(id: &str, title: &str) -> Track {
    Track {
        url: format!("https://www.youtube.com/watch?v={}", id),
        title: title.to_string(),
        artist: "Test Channel".to_string(),
        duration_secs: 200,
        stream_url: format!("https://media.example/{}?sig=1", id),
        platform: Some(Platform::YouTube),
    }
}

#[tokio::test]
async fn test_upsert_is_idempotent_by_url() {
    let store = create_store().await;
    let a = track("aaa", "First Song");

    store.upsert(&a).await.unwrap();
    store.upsert(&a).await.unwrap();
    store.upsert(&a.with_stream_url("https://media.example/aaa?sig=2")).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let stored = store.get_by_url(&a.url).await.unwrap().unwrap();
    assert_eq!(stored.stream_url, "https://media.example/aaa?sig=2");
    assert_eq!(stored.platform, Some(Platform::YouTube));
}

#[tokio::test]
async fn test_get_by_url_missing() {
    let store = create_store().await;
    assert!(store.get_by_url("https://nowhere.example").await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_by_name_normalizes_query() {
    let store = create_store().await;
    store.upsert(&track("abc", "Never Gonna Give You Up")).await.unwrap();

    let found = store.find_by_name("  gonna GIVE you").await.unwrap();
    assert_eq!(found.unwrap().title, "Never Gonna Give You Up");

    assert!(store.find_by_name("together forever").await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_by_name_ignores_tabs_and_line_breaks() {
    let store = create_store().await;
    store.upsert(&track("tab", "Night\tDrive\r\nRemix")).await.unwrap();
    store.upsert(&track("ete", "ÉTÉ Song")).await.unwrap();

    let found = store.find_by_name("night drive remix").await.unwrap();
    assert_eq!(found.unwrap().url, "https://www.youtube.com/watch?v=tab");
    let found = store.find_by_name("nightdrive\tremix").await.unwrap();
    assert_eq!(found.unwrap().url, "https://www.youtube.com/watch?v=tab");

    let found = store.find_by_name("ÉTÉ song").await.unwrap();
    assert_eq!(found.unwrap().url, "https://www.youtube.com/watch?v=ete");
}

#[tokio::test]
async fn test_find_by_name_first_match_wins() {
    let store = create_store().await;
    store.upsert(&track("one", "Song (Live)")).await.unwrap();
    store.upsert(&track("two", "Song (Remastered)")).await.unwrap();

    let found = store.find_by_name("song").await.unwrap().unwrap();
    assert_eq!(found.url, "https://www.youtube.com/watch?v=one");
}

#[tokio::test]
async fn test_find_by_name_treats_wildcards_literally() {
    let store = create_store().await;
    store.upsert(&track("pct", "100% Pure")).await.unwrap();
    store.upsert(&track("xyz", "Other")).await.unwrap();

    assert!(store.find_by_name("100%").await.unwrap().is_some());
    assert!(store.find_by_name("%").await.unwrap().unwrap().title.contains('%'));
    assert!(store.find_by_name("   ").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_stream_url() {
    let store = create_store().await;
    let a = track("aaa", "First Song");
    store.upsert(&a).await.unwrap();

    assert!(store.update_stream_url(&a.url, "https://media.example/fresh").await.unwrap());
    assert!(!store.update_stream_url("https://missing.example", "x").await.unwrap());

    let stored = store.get_by_url(&a.url).await.unwrap().unwrap();
    assert_eq!(stored.stream_url, "https://media.example/fresh");
}

#[tokio::test]
async fn test_platform_registry_seeded() {
    let store = create_store().await;
    let platforms = store.platforms().await.unwrap();
    assert_eq!(
        platforms,
        vec![(1, "YouTube".to_string()), (2, "SoundCloud".to_string())]
    );
}

#[tokio::test]
async fn test_unknown_platform_and_duration() {
    let store = create_store().await;
    let mut live = track("live", "Live Radio");
    live.platform = None;
    live.duration_secs = 0;
    store.upsert(&live).await.unwrap();

    let stored = store.get_by_url(&live.url).await.unwrap().unwrap();
    assert_eq!(stored.platform, None);
    assert_eq!(stored.duration_secs, 0);
}
