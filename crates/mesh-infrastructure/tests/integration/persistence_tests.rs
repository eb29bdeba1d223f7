//! Cache snapshot persistence and background upkeep

use chrono::Utc;
use mesh_domain::CacheEntry;
use mesh_domain::ports::CacheSnapshotStore;
use mesh_infrastructure::cache::{
    JsonFileSnapshotStore, ResponseCache, spawn_expiry_sweeper, spawn_snapshotter,
};
use mesh_infrastructure::config::EvictionPolicy;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn cache() -> Arc<ResponseCache> {
    Arc::new(
        ResponseCache::with_capacity(10, EvictionPolicy::Lru, Duration::from_secs(60))
            .expect("valid cache"),
    )
}

#[tokio::test]
async fn test_missing_snapshot_loads_empty() {
    let dir = tempdir().expect("tempdir");
    let store = JsonFileSnapshotStore::new(dir.path().join("absent.json"));
    assert!(store.load().await.expect("load").is_empty());
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("cache.json");
    let store = JsonFileSnapshotStore::new(&path);

    let before = cache();
    before
        .set("pricing:GET:/quote", json!({"price": 42}), None, vec!["pricing".into()])
        .expect("set");
    before
        .set("stock:GET:/level", json!(7), None, vec!["stock".into()])
        .expect("set");
    store.save(&before.export()).await.expect("save");
    assert!(path.exists());
    assert!(!dir.path().join("nested").join("cache.json.tmp").exists());

    let after = cache();
    let entries = store.load().await.expect("load");
    assert_eq!(after.restore(entries), 2);
    assert_eq!(after.get("pricing:GET:/quote"), Some(json!({"price": 42})));
    assert_eq!(after.invalidate_tag("stock"), 1);
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn test_save_leaves_neighbouring_files_alone() {
    let dir = tempdir().expect("tempdir");
    let neighbour = dir.path().join("cache.tmp");
    std::fs::write(&neighbour, b"not a snapshot").expect("write neighbour");

    let store = JsonFileSnapshotStore::new(dir.path().join("cache.json"));
    let source = cache();
    source.set("k", json!(1), None, Vec::new()).expect("set");
    store.save(&source.export()).await.expect("save");
    assert_eq!(
        std::fs::read(&neighbour).expect("neighbour kept"),
        b"not a snapshot"
    );

    // A snapshot whose own name ends in .tmp still round-trips
    let odd = JsonFileSnapshotStore::new(&neighbour);
    odd.save(&source.export()).await.expect("save over .tmp name");
    assert!(!dir.path().join("cache.tmp.tmp").exists());
    let entries = odd.load().await.expect("load");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "k");
}

#[tokio::test]
async fn test_restore_drops_entries_that_expired_while_down() {
    let dir = tempdir().expect("tempdir");
    let store = JsonFileSnapshotStore::new(dir.path().join("cache.json"));
    let now = Utc::now();
    let stale = CacheEntry::new(
        "old".into(),
        json!(1),
        Duration::from_millis(1),
        Vec::new(),
        now - chrono::TimeDelta::seconds(10),
    );
    let fresh = CacheEntry::new("new".into(), json!(2), Duration::from_secs(60), Vec::new(), now);
    store.save(&[stale, fresh]).await.expect("save");

    let restored = cache();
    assert_eq!(restored.restore(store.load().await.expect("load")), 1);
    assert!(restored.contains("new"));
    assert!(!restored.contains("old"));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_an_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cache.json");
    std::fs::write(&path, b"{not json").expect("write");
    assert!(JsonFileSnapshotStore::new(&path).load().await.is_err());
}

#[tokio::test]
async fn test_snapshotter_writes_periodically() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(JsonFileSnapshotStore::new(dir.path().join("cache.json")));
    let cache = cache();
    cache.set("k", json!("v"), None, Vec::new()).expect("set");

    let task = spawn_snapshotter(Arc::clone(&cache), store.clone(), Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(60)).await;
    task.stop().await;

    let entries = store.load().await.expect("load");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "k");
}

#[tokio::test]
async fn test_sweeper_purges_expired_entries() {
    let cache = cache();
    cache
        .set("short", json!(1), Some(Duration::from_millis(10)), Vec::new())
        .expect("set");
    cache.set("long", json!(2), None, Vec::new()).expect("set");

    let task = spawn_expiry_sweeper(Arc::clone(&cache), Duration::from_millis(15));
    tokio::time::sleep(Duration::from_millis(60)).await;
    task.stop().await;

    assert_eq!(cache.len(), 1);
    assert!(cache.contains("long"));
}
