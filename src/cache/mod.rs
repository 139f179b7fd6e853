// src/cache/mod.rs
pub mod durable;
pub mod memory;

use std::time::Duration;

// Logical dataset keys in the durable tier.
pub const KEY_FEED_ALL: &str = "feed:all";
pub const KEY_ARTICLES_ALL: &str = "document_store:articles:all";
pub const KEY_PHOTOS_ALL: &str = "document_store:photos:all";

/// Durable key for one article's rendered content (the expensive path).
pub fn article_content_key(id: &str) -> String {
    format!("document_store:article:{id}")
}

/// TTL for aggregated datasets in the durable tier.
pub const DATASET_TTL: Duration = Duration::from_secs(60 * 60);

/// TTL for the in-process memoization tier.
pub const MEMORY_TTL: Duration = Duration::from_secs(5 * 60);
