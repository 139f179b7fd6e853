// src/adapters/channel_feed.rs
//! Channel-feed adapter: a messaging channel surfaced as RSS through a
//! channel→feed bridge proxy.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::adapters::{first_img_src, parse_feed_date, rss, strip_tags, synthesized_id, Page, SourceAdapter};
use crate::env::{RuntimeEnv, ENV_CHANNEL_BRIDGE_URL, ENV_CHANNEL_FEED_ID};
use crate::model::{Attachment, AttachmentKind, FeedItem, Kind, Metadata, MicroblogMetadata, Source};

const DEFAULT_BRIDGE_URL: &str = "https://rsshub.app";
const PLATFORM: &str = "telegram";

pub struct ChannelFeedAdapter {
    client: reqwest::Client,
    feed_id: String,
    bridge_url: String,
}

impl ChannelFeedAdapter {
    pub fn from_env(env: &RuntimeEnv, client: reqwest::Client) -> Option<Self> {
        let Some(feed_id) = env.resolve(ENV_CHANNEL_FEED_ID) else {
            warn!("channel feed not configured; adapter disabled");
            return None;
        };
        Some(Self {
            client,
            feed_id,
            bridge_url: env
                .resolve(ENV_CHANNEL_BRIDGE_URL)
                .unwrap_or_else(|| DEFAULT_BRIDGE_URL.to_string()),
        })
    }

    fn feed_url(&self) -> String {
        format!(
            "{}/telegram/channel/{}",
            self.bridge_url.trim_end_matches('/'),
            self.feed_id
        )
    }
}

/// Bridges append a platform suffix to the channel title; strip it to get
/// the clean display name.
pub fn clean_channel_name(feed_title: &str) -> String {
    static RE_SUFFIX: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_SUFFIX
        .get_or_init(|| regex::Regex::new(r"(?i)\s*[-–—|]\s*telegram(\s+channel)?\s*$").unwrap());
    re.replace(feed_title.trim(), "").trim().to_string()
}

/// Pure normalization of one fetched feed document.
pub fn parse_channel_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let t0 = std::time::Instant::now();
    let feed = rss::parse(xml).context("parsing channel feed xml")?;
    let channel_name = feed
        .channel
        .title
        .as_deref()
        .map(clean_channel_name)
        .unwrap_or_default();

    let mut out = Vec::with_capacity(feed.channel.items.len());
    for it in feed.channel.items {
        let raw = it.description.as_deref().unwrap_or_default();
        let content = strip_tags(raw);
        if content.is_empty() && first_img_src(raw).is_none() {
            continue;
        }
        let published_at = parse_feed_date(it.pub_date.as_deref());

        // Embedded image doubles as cover and structured attachment.
        let image = first_img_src(raw);
        let attachments = image
            .iter()
            .map(|url| Attachment {
                kind: AttachmentKind::Image,
                url: url.clone(),
                thumbnail: None,
                alt_text: None,
            })
            .collect();

        let id = it.stable_id().unwrap_or_else(|| {
            synthesized_id(&[
                it.link.as_deref().unwrap_or_default(),
                &published_at.to_rfc3339(),
                &content,
            ])
        });

        out.push(FeedItem {
            id,
            kind: Kind::Microblog,
            title: None,
            content,
            published_at,
            source: Source::MessagingChannel,
            url: it.link,
            cover_image: image,
            metadata: Metadata::Microblog(MicroblogMetadata {
                platform: PLATFORM.to_string(),
                channel_name: channel_name.clone(),
                like_count: None,
                reply_count: None,
                attachments,
            }),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("adapter_parse_ms").record(ms);
    counter!("adapter_items_total").increment(out.len() as u64);
    Ok(out)
}

#[async_trait]
impl SourceAdapter for ChannelFeedAdapter {
    fn name(&self) -> &'static str {
        "channel_feed"
    }

    fn source(&self) -> Source {
        Source::MessagingChannel
    }

    async fn fetch_page(&self, _page_size_hint: usize, _cursor: Option<String>) -> Result<Page> {
        let body = self
            .client
            .get(self.feed_url())
            .send()
            .await
            .context("channel feed http get")?
            .error_for_status()
            .context("channel feed http status")?
            .text()
            .await
            .context("channel feed http body")?;
        Ok(Page::last(parse_channel_feed(&body)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<rss version="2.0"><channel>
        <title>晚间频道 - Telegram Channel</title>
        <item>
            <title>ignored</title>
            <link>https://t.me/evening/42</link>
            <guid isPermaLink="false">tg-42</guid>
            <pubDate>Tue, 02 Jan 2024 20:00:00 GMT</pubDate>
            <description>&lt;p&gt;今晚的天空&lt;/p&gt;&lt;img src="https://cdn.tg.example/sky.jpg"&gt;</description>
        </item>
        <item>
            <link>https://t.me/evening/43</link>
            <pubDate>Wed, 03 Jan 2024 08:00:00 GMT</pubDate>
            <description>plain words only</description>
        </item>
    </channel></rss>"#;

    #[test]
    fn channel_name_suffix_is_stripped() {
        assert_eq!(clean_channel_name("晚间频道 - Telegram Channel"), "晚间频道");
        assert_eq!(clean_channel_name("notes — Telegram"), "notes");
        assert_eq!(clean_channel_name("no suffix here"), "no suffix here");
    }

    #[test]
    fn items_normalize_to_microblog_entities() {
        let items = parse_channel_feed(FIXTURE).expect("parse");
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.id, "tg-42");
        assert_eq!(first.kind, Kind::Microblog);
        assert_eq!(first.title, None);
        assert_eq!(first.content, "今晚的天空");
        assert_eq!(
            first.cover_image.as_deref(),
            Some("https://cdn.tg.example/sky.jpg")
        );
        match &first.metadata {
            Metadata::Microblog(m) => {
                assert_eq!(m.platform, "telegram");
                assert_eq!(m.channel_name, "晚间频道");
                assert_eq!(m.attachments.len(), 1);
                assert_eq!(m.attachments[0].kind, AttachmentKind::Image);
                assert_eq!(m.attachments[0].url, "https://cdn.tg.example/sky.jpg");
            }
            other => panic!("expected microblog metadata, got {other:?}"),
        }
    }

    #[test]
    fn missing_guid_falls_back_to_link_then_stays_deterministic() {
        let a = parse_channel_feed(FIXTURE).expect("parse");
        let b = parse_channel_feed(FIXTURE).expect("parse");
        assert_eq!(a[1].id, b[1].id, "fallback ids must be stable across refetches");
        assert_eq!(a[1].id, "https://t.me/evening/43");
    }
}
