// tests/feed_fallback.rs
//
// Adapter configuration gating: with zero adapters configured, get_feed
// serves the embedded static dataset without issuing any network call; the
// explicit fallback flag short-circuits the same way even when an adapter
// is configured.
//
// These tests scrub the known configuration keys from the process
// environment, so they are serialized against anything else touching env.

use std::collections::HashMap;

use serial_test::serial;

use feed_aggregator::aggregator::{Aggregator, FeedOptions};
use feed_aggregator::env::{RuntimeEnv, ENV_MEDIA_LOG_FEED_URL, KNOWN_KEYS};
use feed_aggregator::fallback;

fn scrub_process_env() {
    for key in KNOWN_KEYS {
        std::env::remove_var(key);
    }
}

#[tokio::test]
#[serial]
async fn zero_configured_adapters_serve_the_static_fallback() {
    scrub_process_env();
    let agg = Aggregator::new(RuntimeEnv::from_process());

    let items = agg.get_feed(&FeedOptions::default()).await;
    assert_eq!(items, fallback::feed_items());
}

#[tokio::test]
#[serial]
async fn explicit_fallback_flag_short_circuits_configured_adapters() {
    scrub_process_env();
    let mut injected = HashMap::new();
    injected.insert(
        ENV_MEDIA_LOG_FEED_URL.to_string(),
        "https://log.example/feed".to_string(),
    );
    let agg = Aggregator::new(RuntimeEnv::with_injected(injected));

    let opts = FeedOptions {
        use_fallback: true,
        limit: None,
    };
    assert_eq!(agg.get_feed(&opts).await, fallback::feed_items());
}

#[tokio::test]
#[serial]
async fn fallback_set_honors_the_limit_option() {
    scrub_process_env();
    let agg = Aggregator::new(RuntimeEnv::from_process());

    let opts = FeedOptions {
        use_fallback: false,
        limit: Some(1),
    };
    let items = agg.get_feed(&opts).await;
    assert_eq!(items.len(), 1);
}
