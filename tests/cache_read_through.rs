// tests/cache_read_through.rs
//
// Durable-tier read-through behavior against a real disk-backed store:
// - fresh key invokes the producer exactly once and returns its value
// - a second call within the TTL, once the write-back lands, serves the
//   cached value without invoking the producer again
// - explicit delete makes the next call invoke the producer again
// - an unavailable tier bypasses caching entirely
//
// The write-back is dispatched off the response path, so tests poll for it
// instead of assuming it completed synchronously.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Result;
use feed_aggregator::cache::durable::{DiskStore, DurableCache};
use feed_aggregator::fallback;
use feed_aggregator::model::FeedItem;
use tokio::time::sleep;

const TTL: Duration = Duration::from_secs(60);

fn disk_cache(dir: &std::path::Path) -> DurableCache {
    DurableCache::with_backend(Arc::new(DiskStore::new(dir)))
}

async fn produce_counted(calls: &Arc<AtomicUsize>) -> Result<Vec<String>> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(vec!["alpha".to_string(), "beta".to_string()])
}

/// Wait (bounded) for the spawned write-back to land in the store.
async fn wait_for_write(cache: &DurableCache, key: &str) {
    for _ in 0..100 {
        if cache.get::<Vec<String>>(key).await.is_some() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("write-back for '{key}' never landed");
}

#[tokio::test]
async fn fresh_key_invokes_producer_once_then_serves_from_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = disk_cache(dir.path());
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache
        .with_cache("dataset", TTL, || produce_counted(&calls))
        .await
        .expect("first read-through");
    assert_eq!(first, vec!["alpha".to_string(), "beta".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    wait_for_write(&cache, "dataset").await;

    let second = cache
        .with_cache("dataset", TTL, || produce_counted(&calls))
        .await
        .expect("second read-through");
    assert_eq!(second, first);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "second call within TTL must not invoke the producer"
    );
}

#[tokio::test]
async fn delete_invalidates_and_reinvokes_producer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = disk_cache(dir.path());
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .with_cache("dataset", TTL, || produce_counted(&calls))
        .await
        .expect("prime");
    wait_for_write(&cache, "dataset").await;

    cache.delete("dataset").await;

    cache
        .with_cache("dataset", TTL, || produce_counted(&calls))
        .await
        .expect("after delete");
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "delete must force the next call through the producer"
    );
}

#[tokio::test]
async fn unavailable_tier_bypasses_straight_to_producer() {
    let cache = DurableCache::disabled();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        cache
            .with_cache("dataset", TTL, || produce_counted(&calls))
            .await
            .expect("bypass");
    }
    assert_eq!(
        calls.load(Ordering::SeqCst),
        3,
        "without a binding every call goes to the producer"
    );
}

#[tokio::test]
async fn producer_error_propagates_and_stores_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = disk_cache(dir.path());

    let result: Result<Vec<String>> = cache
        .with_cache("dataset", TTL, || async { anyhow::bail!("upstream down") })
        .await;
    assert!(result.is_err());
    assert_eq!(cache.get::<Vec<String>>("dataset").await, None);
}

#[tokio::test]
async fn entity_timestamps_survive_the_text_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = disk_cache(dir.path());

    let items = fallback::feed_items();
    assert!(cache.set("feed", &items, TTL).await);

    let revived: Vec<FeedItem> = cache.get("feed").await.expect("hit");
    assert_eq!(revived, items, "typed read must revive timestamp fields");
}
