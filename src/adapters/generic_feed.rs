// src/adapters/generic_feed.rs
//! Generic feed adapter: minimal fallback for arbitrary feeds. Maps
//! title/snippet/date/link straight onto an article-kind entity with no
//! heuristic extraction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use tracing::warn;

use crate::adapters::{parse_feed_date, rss, strip_tags, synthesized_id, Page, SourceAdapter};
use crate::env::{RuntimeEnv, ENV_GENERIC_FEED_URL};
use crate::model::{ArticleMetadata, FeedItem, Kind, Metadata, Source};

pub struct GenericFeedAdapter {
    client: reqwest::Client,
    feed_url: String,
}

impl GenericFeedAdapter {
    pub fn from_env(env: &RuntimeEnv, client: reqwest::Client) -> Option<Self> {
        let Some(feed_url) = env.resolve(ENV_GENERIC_FEED_URL) else {
            warn!("generic feed not configured; adapter disabled");
            return None;
        };
        Some(Self { client, feed_url })
    }
}

pub fn parse_generic_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let feed = rss::parse(xml).context("parsing generic feed xml")?;

    let mut out = Vec::with_capacity(feed.channel.items.len());
    for it in feed.channel.items {
        let title = it.title.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() {
            continue;
        }
        let excerpt = strip_tags(it.description.as_deref().unwrap_or_default());
        let published_at = parse_feed_date(it.pub_date.as_deref());
        let id = it.stable_id().unwrap_or_else(|| {
            synthesized_id(&[
                it.link.as_deref().unwrap_or_default(),
                &published_at.to_rfc3339(),
                title,
            ])
        });

        out.push(FeedItem {
            id,
            kind: Kind::Article,
            title: Some(title.to_string()),
            content: String::new(),
            published_at,
            source: Source::GenericFeed,
            url: it.link,
            cover_image: None,
            metadata: Metadata::Article(ArticleMetadata {
                reading_time_minutes: 1,
                tags: Vec::new(),
                excerpt,
                featured: false,
            }),
        });
    }

    counter!("adapter_items_total").increment(out.len() as u64);
    Ok(out)
}

#[async_trait]
impl SourceAdapter for GenericFeedAdapter {
    fn name(&self) -> &'static str {
        "generic_feed"
    }

    fn source(&self) -> Source {
        Source::GenericFeed
    }

    async fn fetch_page(&self, _page_size_hint: usize, _cursor: Option<String>) -> Result<Page> {
        let body = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .context("generic feed http get")?
            .error_for_status()
            .context("generic feed http status")?
            .text()
            .await
            .context("generic feed http body")?;
        Ok(Page::last(parse_generic_feed(&body)?))
    }
}
