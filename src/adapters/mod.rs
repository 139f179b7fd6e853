// src/adapters/mod.rs
//! Source adapters: one per upstream, each converting upstream-native
//! records into the unified entity model.

pub mod channel_feed;
pub mod document_store;
pub mod generic_feed;
pub mod media_log;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::OnceCell;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::model::{FeedItem, Source};

pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Pagination safety cap for `fetch_all`.
const MAX_PAGES: usize = 20;

/// One page of normalized entities from a paginated upstream.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<FeedItem>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn last(items: Vec<FeedItem>) -> Self {
        Self {
            items,
            has_more: false,
            next_cursor: None,
        }
    }
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn source(&self) -> Source;

    async fn fetch_page(&self, page_size_hint: usize, cursor: Option<String>) -> Result<Page>;

    /// Loop pagination to exhaustion (bounded by a hard page cap).
    async fn fetch_all(&self) -> Result<Vec<FeedItem>> {
        let mut items = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(DEFAULT_PAGE_SIZE, cursor).await?;
            items.extend(page.items);
            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(items)
    }
}

/// Decode HTML entities, strip tags, collapse whitespace.
pub fn strip_tags(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let out = re_tags.replace_all(&decoded, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// First `<img src=...>` match in raw (unstripped) markup.
pub fn first_img_src(s: &str) -> Option<String> {
    static RE_IMG: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_IMG.get_or_init(|| {
        regex::Regex::new(r#"(?is)<img[^>]*\bsrc\s*=\s*["']([^"']+)["']"#).unwrap()
    });
    re.captures(s)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse an upstream date (RFC 2822 as RSS uses, falling back to RFC 3339).
/// A missing or unparseable date substitutes the current fetch time —
/// degraded but well-defined, so ordering stays total.
pub fn parse_feed_date(raw: Option<&str>) -> DateTime<Utc> {
    if let Some(ts) = raw {
        if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
            let unix = dt.to_offset(UtcOffset::UTC).unix_timestamp();
            if let Some(dt) = Utc.timestamp_opt(unix, 0).single() {
                return dt;
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
            return dt.with_timezone(&Utc);
        }
    }
    Utc::now()
}

/// Deterministic fallback identifier for upstream items lacking a stable
/// guid: a short content hash over the given parts. Stable across
/// refetches of the same logical item, so identity-based caching and
/// de-dup keep working.
pub fn synthesized_id(parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Shared RSS 2.0 wire shape (superset of the fields the feed adapters
/// consume), deserialized with quick-xml.
pub(crate) mod rss {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Rss {
        pub channel: Channel,
    }

    #[derive(Debug, Deserialize)]
    pub struct Channel {
        pub title: Option<String>,
        #[serde(rename = "item", default)]
        pub items: Vec<Item>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Item {
        pub title: Option<String>,
        pub link: Option<String>,
        pub guid: Option<Guid>,
        #[serde(rename = "pubDate")]
        pub pub_date: Option<String>,
        pub description: Option<String>,
    }

    /// `<guid isPermaLink="...">value</guid>` — attributes ignored.
    #[derive(Debug, Deserialize)]
    pub struct Guid {
        #[serde(rename = "$text")]
        pub value: Option<String>,
    }

    impl Item {
        pub fn stable_id(&self) -> Option<String> {
            self.guid
                .as_ref()
                .and_then(|g| g.value.clone())
                .filter(|v| !v.trim().is_empty())
                .or_else(|| self.link.clone().filter(|v| !v.trim().is_empty()))
        }
    }

    pub fn parse(xml: &str) -> anyhow::Result<Rss> {
        use anyhow::Context as _;
        quick_xml::de::from_str(xml).context("parsing rss xml")
    }
}
