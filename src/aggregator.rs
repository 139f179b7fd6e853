// src/aggregator.rs
//! Merges adapter outputs into the unified read API: one chronologically
//! ordered feed, the archive projection, and the currently-consuming list.
//!
//! Cache composition follows the dependency order: the in-process tier
//! wraps the durable tier, which wraps the adapter fan-out. Each adapter
//! failure is caught individually and substitutes an empty contribution;
//! only the every-adapter-failed case degrades to the static fallback.

use anyhow::{bail, Result};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::adapters::channel_feed::ChannelFeedAdapter;
use crate::adapters::document_store::{
    reading_time_minutes, slug_of, Dataset, DocumentStoreAdapter,
};
use crate::adapters::generic_feed::GenericFeedAdapter;
use crate::adapters::media_log::MediaLogAdapter;
use crate::adapters::SourceAdapter;
use crate::cache::durable::DurableCache;
use crate::cache::memory::MemoryCache;
use crate::cache::{
    article_content_key, DATASET_TTL, KEY_ARTICLES_ALL, KEY_FEED_ALL, KEY_PHOTOS_ALL,
};
use crate::env::{
    RuntimeEnv, ENV_CHANNEL_FEED_ID, ENV_DOCSTORE_API_KEY, ENV_DOCSTORE_ARTICLES_DATASET,
    ENV_DOCSTORE_PHOTOS_DATASET, ENV_GENERIC_FEED_URL, ENV_MEDIA_LOG_FEED_URL, ENV_USE_FALLBACK,
};
use crate::fallback;
use crate::model::{
    archive_groups, ArchiveGroup, ConsumeStatus, CurrentItem, FeedItem, Kind, Metadata,
};

const CURRENTLY_CONSUMING_CAP: usize = 5;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_requests_total", "Feed dataset requests served.");
        describe_counter!("adapter_items_total", "Entities normalized by adapters.");
        describe_counter!("adapter_errors_total", "Adapter fetch/parse failures.");
        describe_counter!("durable_cache_hits_total", "Durable tier read-through hits.");
        describe_counter!("durable_cache_misses_total", "Durable tier read-through misses.");
        describe_histogram!("adapter_parse_ms", "Feed parse time in milliseconds.");
    });
}

#[derive(Debug, Clone, Default)]
pub struct FeedOptions {
    /// Serve the embedded static dataset unconditionally (no network).
    pub use_fallback: bool,
    pub limit: Option<usize>,
}

pub struct Aggregator {
    env: RuntimeEnv,
    client: reqwest::Client,
    durable: DurableCache,
    feed_cache: MemoryCache<Vec<FeedItem>>,
    archive_cache: MemoryCache<Vec<ArchiveGroup>>,
    consuming_cache: MemoryCache<Vec<CurrentItem>>,
}

impl Aggregator {
    pub fn new(env: RuntimeEnv) -> Self {
        ensure_metrics_described();
        let durable = DurableCache::from_env(&env);
        Self {
            env,
            client: reqwest::Client::new(),
            durable,
            feed_cache: MemoryCache::new(),
            archive_cache: MemoryCache::new(),
            consuming_cache: MemoryCache::new(),
        }
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The unified, sorted entity stream.
    pub async fn get_feed(&self, opts: &FeedOptions) -> Vec<FeedItem> {
        counter!("feed_requests_total").increment(1);

        if opts.use_fallback || self.env.flag(ENV_USE_FALLBACK) || !self.any_adapter_configured() {
            return truncate(fallback::feed_items(), opts.limit);
        }

        if let Some(cached) = self.feed_cache.get() {
            return truncate(cached, opts.limit);
        }

        let items = match self
            .durable
            .with_cache(KEY_FEED_ALL, DATASET_TTL, || self.collect_feed())
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!(error = ?e, "feed aggregation failed; serving static fallback");
                return truncate(fallback::feed_items(), opts.limit);
            }
        };

        self.feed_cache.set(items.clone());
        truncate(items, opts.limit)
    }

    /// Year-grouped archive view, derived from the article set. Reuses the
    /// document-store adapter's own durable key; there is no separate
    /// cache of the raw article list.
    pub async fn get_archive_groups(&self) -> Vec<ArchiveGroup> {
        if let Some(cached) = self.archive_cache.get() {
            return cached;
        }

        let articles = if self.env.flag(ENV_USE_FALLBACK) {
            fallback_articles()
        } else {
            match self.articles_result().await {
                Some(Ok(items)) => items,
                Some(Err(e)) => {
                    warn!(error = ?e, "article fetch failed; archive uses static fallback");
                    fallback_articles()
                }
                None => fallback_articles(),
            }
        };

        let groups = archive_groups(&articles);
        self.archive_cache.set(groups.clone());
        groups
    }

    /// Photo-kind entities from the photos dataset.
    pub async fn get_photos(&self) -> Vec<FeedItem> {
        let items = match self.photos_result().await {
            Some(Ok(items)) => items,
            Some(Err(e)) => {
                warn!(error = ?e, "photo fetch failed; serving empty set");
                Vec::new()
            }
            None => fallback::feed_items(),
        };
        items.into_iter().filter(|i| i.kind == Kind::Photo).collect()
    }

    /// In-progress media-log items, capped, feed order preserved.
    pub async fn get_currently_consuming(&self) -> Vec<CurrentItem> {
        if let Some(cached) = self.consuming_cache.get() {
            return cached;
        }

        let items = match self.media_result().await {
            Some(Ok(items)) => items,
            Some(Err(e)) => {
                warn!(error = ?e, "media log fetch failed; serving empty set");
                Vec::new()
            }
            None => Vec::new(),
        };

        let current: Vec<CurrentItem> = items
            .iter()
            .filter_map(current_item)
            .take(CURRENTLY_CONSUMING_CAP)
            .collect();
        self.consuming_cache.set(current.clone());
        current
    }

    /// Full-content article lookup — the expensive path, cache-keyed per
    /// record id in the durable tier.
    pub async fn get_article_by_slug(&self, slug: &str) -> Result<Option<FeedItem>> {
        let Some(adapter) =
            DocumentStoreAdapter::from_env(&self.env, self.client.clone(), Dataset::Articles)
        else {
            return Ok(None);
        };

        let articles = self
            .durable
            .with_cache(KEY_ARTICLES_ALL, DATASET_TTL, || adapter.fetch_all())
            .await?;
        let Some(summary) = articles.iter().find(|i| slug_of(i) == Some(slug)) else {
            return Ok(None);
        };

        let key = article_content_key(&summary.id);
        let content = self
            .durable
            .with_cache(&key, DATASET_TTL, || adapter.fetch_content(&summary.id))
            .await?;

        let mut full = summary.clone();
        full.content = content;
        if let Metadata::Article(meta) = &mut full.metadata {
            meta.reading_time_minutes = reading_time_minutes(&full.content);
        }
        Ok(Some(full))
    }

    /// Invalidate the known document-store dataset keys in the durable
    /// tier. Errors when the tier has no binding.
    pub async fn clear_durable(&self) -> Result<()> {
        if !self.durable.is_available() {
            bail!("durable cache unavailable in this runtime");
        }
        self.durable.delete(KEY_ARTICLES_ALL).await;
        self.durable.delete(KEY_PHOTOS_ALL).await;
        Ok(())
    }

    fn any_adapter_configured(&self) -> bool {
        let docstore = self.env.resolve(ENV_DOCSTORE_API_KEY).is_some()
            && (self.env.resolve(ENV_DOCSTORE_ARTICLES_DATASET).is_some()
                || self.env.resolve(ENV_DOCSTORE_PHOTOS_DATASET).is_some());
        docstore
            || self.env.resolve(ENV_CHANNEL_FEED_ID).is_some()
            || self.env.resolve(ENV_MEDIA_LOG_FEED_URL).is_some()
            || self.env.resolve(ENV_GENERIC_FEED_URL).is_some()
    }

    /// Concurrent fan-out over configured adapters; fan-in before sorting.
    /// Adapter calls never depend on each other's results.
    async fn collect_feed(&self) -> Result<Vec<FeedItem>> {
        let (articles, photos, channel, media, generic) = tokio::join!(
            self.articles_result(),
            self.photos_result(),
            self.channel_result(),
            self.media_result(),
            self.generic_result(),
        );

        let mut groups: Vec<Vec<FeedItem>> = Vec::new();
        let mut configured = 0usize;
        let mut failed = 0usize;
        for (name, outcome) in [
            ("document_store:articles", articles),
            ("document_store:photos", photos),
            ("channel_feed", channel),
            ("media_log", media),
            ("generic_feed", generic),
        ] {
            let Some(result) = outcome else { continue };
            configured += 1;
            match result {
                Ok(items) => groups.push(items),
                Err(e) => {
                    failed += 1;
                    counter!("adapter_errors_total").increment(1);
                    warn!(error = ?e, adapter = name, "adapter failed; contributing empty set");
                }
            }
        }

        if configured > 0 && failed == configured {
            bail!("all configured adapters failed");
        }
        Ok(merge_and_sort(groups))
    }

    // Per-adapter outcomes: `None` = not configured, `Err` = fetch failed.
    // The two document-store datasets read through their own durable keys.

    async fn articles_result(&self) -> Option<Result<Vec<FeedItem>>> {
        let adapter =
            DocumentStoreAdapter::from_env(&self.env, self.client.clone(), Dataset::Articles)?;
        Some(
            self.durable
                .with_cache(KEY_ARTICLES_ALL, DATASET_TTL, || adapter.fetch_all())
                .await,
        )
    }

    async fn photos_result(&self) -> Option<Result<Vec<FeedItem>>> {
        let adapter =
            DocumentStoreAdapter::from_env(&self.env, self.client.clone(), Dataset::Photos)?;
        Some(
            self.durable
                .with_cache(KEY_PHOTOS_ALL, DATASET_TTL, || adapter.fetch_all())
                .await,
        )
    }

    async fn channel_result(&self) -> Option<Result<Vec<FeedItem>>> {
        let adapter = ChannelFeedAdapter::from_env(&self.env, self.client.clone())?;
        Some(adapter.fetch_all().await)
    }

    async fn media_result(&self) -> Option<Result<Vec<FeedItem>>> {
        let adapter = MediaLogAdapter::from_env(&self.env, self.client.clone())?;
        Some(adapter.fetch_all().await)
    }

    async fn generic_result(&self) -> Option<Result<Vec<FeedItem>>> {
        let adapter = GenericFeedAdapter::from_env(&self.env, self.client.clone())?;
        Some(adapter.fetch_all().await)
    }
}

/// Merge contributions and sort by publication time descending. The sort
/// is stable: entities sharing a timestamp keep their adapter-fetch order.
pub fn merge_and_sort(groups: Vec<Vec<FeedItem>>) -> Vec<FeedItem> {
    let mut items: Vec<FeedItem> = groups.into_iter().flatten().collect();
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items
}

fn truncate(mut items: Vec<FeedItem>, limit: Option<usize>) -> Vec<FeedItem> {
    if let Some(n) = limit {
        items.truncate(n);
    }
    items
}

fn fallback_articles() -> Vec<FeedItem> {
    fallback::feed_items()
        .into_iter()
        .filter(|i| i.kind == Kind::Article)
        .collect()
}

fn current_item(item: &FeedItem) -> Option<CurrentItem> {
    let Metadata::MediaLog(m) = &item.metadata else {
        return None;
    };
    (m.status == ConsumeStatus::InProgress).then(|| CurrentItem {
        id: item.id.clone(),
        title: item.title.clone().unwrap_or_default(),
        media_type: m.media_type,
        url: item.url.clone(),
        cover_image: item.cover_image.clone(),
        rating: m.rating,
        max_rating: m.max_rating,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MediaLogMetadata, MediaType, Source};

    fn media_item(id: &str, ts: &str, status: ConsumeStatus) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            kind: Kind::Media,
            title: Some(id.to_string()),
            content: String::new(),
            published_at: ts.parse().expect("test timestamp"),
            source: Source::MediaLog,
            url: None,
            cover_image: None,
            metadata: Metadata::MediaLog(MediaLogMetadata {
                media_type: MediaType::Book,
                rating: None,
                max_rating: None,
                review: None,
                status,
                creator: None,
                year: None,
            }),
        }
    }

    #[test]
    fn merge_sorts_descending_and_keeps_tie_order() {
        let a = media_item("a", "2024-01-01T00:00:00Z", ConsumeStatus::Completed);
        let b = media_item("b", "2024-01-01T00:00:00Z", ConsumeStatus::Completed);
        let newer = media_item("n", "2024-02-01T00:00:00Z", ConsumeStatus::Completed);

        let merged = merge_and_sort(vec![vec![a.clone()], vec![b.clone(), newer.clone()]]);
        assert_eq!(merged[0].id, "n");
        // ties keep fetch order: group one before group two
        assert_eq!(merged[1].id, "a");
        assert_eq!(merged[2].id, "b");
    }

    #[test]
    fn current_item_filters_to_in_progress() {
        let reading = media_item("r", "2024-01-01T00:00:00Z", ConsumeStatus::InProgress);
        let done = media_item("d", "2024-01-01T00:00:00Z", ConsumeStatus::Completed);
        assert!(current_item(&reading).is_some());
        assert!(current_item(&done).is_none());
    }
}
