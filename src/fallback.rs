// src/fallback.rs
//! Embedded static dataset, served when no adapter is configured or the
//! whole aggregation degrades.

use once_cell::sync::Lazy;

use crate::model::FeedItem;

static FALLBACK: Lazy<Vec<FeedItem>> = Lazy::new(|| {
    let raw = include_str!("../fallback_feed.json");
    serde_json::from_str(raw).expect("valid fallback dataset")
});

pub fn feed_items() -> Vec<FeedItem> {
    FALLBACK.clone()
}
