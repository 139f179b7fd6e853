// src/adapters/media_log.rs
//! Media-log adapter: a personal ratings/reviews activity feed.
//!
//! Structured facts (media type, status, rating, review, cover) only exist
//! as conventions inside free text, so normalization is a layered
//! heuristic pipeline of pure functions. Stage ordering is a contract:
//! each stage runs only when the prior one found nothing, which keeps the
//! behavior reproducible and unit-testable without network I/O.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::adapters::{first_img_src, parse_feed_date, rss, strip_tags, synthesized_id, Page, SourceAdapter};
use crate::env::{RuntimeEnv, ENV_MEDIA_LOG_FEED_URL};
use crate::model::{ConsumeStatus, FeedItem, Kind, MediaLogMetadata, MediaType, Metadata, Source};

pub struct MediaLogAdapter {
    client: reqwest::Client,
    feed_url: String,
}

impl MediaLogAdapter {
    pub fn from_env(env: &RuntimeEnv, client: reqwest::Client) -> Option<Self> {
        let Some(feed_url) = env.resolve(ENV_MEDIA_LOG_FEED_URL) else {
            warn!("media log feed not configured; adapter disabled");
            return None;
        };
        Some(Self { client, feed_url })
    }
}

// ---------------------------------------------------------------------------
// Stage 1: media-type classification
// ---------------------------------------------------------------------------

static RE_TV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)第\s*[一二三四五六七八九十\d]+\s*季|season\s*\d+|\bS\d{1,2}E\d{1,3}\b")
        .expect("tv pattern regex")
});

/// Classify by URL namespace; a season/episode pattern in the title
/// reclassifies the movie namespace as tv.
pub fn classify_media_type(url: &str, title: &str) -> MediaType {
    let lower = url.to_ascii_lowercase();
    if lower.contains("book.") || lower.contains("/book/") {
        return MediaType::Book;
    }
    if lower.contains("music.") || lower.contains("/music/") {
        return MediaType::Music;
    }
    if lower.contains("game.") || lower.contains("/game/") {
        return MediaType::Game;
    }
    if lower.contains("movie.") || lower.contains("/movie/") || lower.contains("/subject/") {
        if RE_TV.is_match(title) {
            return MediaType::Tv;
        }
        return MediaType::Movie;
    }
    MediaType::Book
}

// ---------------------------------------------------------------------------
// Stage 2: status keywords + title cleanup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStatus {
    Reading,
    Watching,
    Listening,
    WantToRead,
    WantToWatch,
    WantToListen,
    Done,
}

// "Want" phrases come first so 想读 never half-matches as 读过 territory
// and "want to read" is never shadowed by "reading".
const STATUS_KEYWORDS: &[(&str, RawStatus)] = &[
    ("想读", RawStatus::WantToRead),
    ("想看", RawStatus::WantToWatch),
    ("想听", RawStatus::WantToListen),
    ("want to read", RawStatus::WantToRead),
    ("want to watch", RawStatus::WantToWatch),
    ("want to listen", RawStatus::WantToListen),
    ("在读", RawStatus::Reading),
    ("reading", RawStatus::Reading),
    ("在看", RawStatus::Watching),
    ("watching", RawStatus::Watching),
    ("在听", RawStatus::Listening),
    ("listening", RawStatus::Listening),
    ("读过", RawStatus::Done),
    ("看过", RawStatus::Done),
    ("听过", RawStatus::Done),
    ("watched", RawStatus::Done),
    ("listened", RawStatus::Done),
];

const RECENT_PREFIXES: &[&str] = &["最近", "recently"];

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '：' | ',' | '，' | '-'))
}

/// Strip a leading 《…》 pair when it wraps the whole title.
fn unwrap_brackets(s: &str) -> &str {
    s.strip_prefix('《')
        .and_then(|rest| rest.strip_suffix('》'))
        .unwrap_or(s)
}

/// Scan the title for a status keyword; on match strip the keyword and the
/// "recently" prefix token, yielding the clean display title. Default
/// status is done.
pub fn extract_status(title: &str) -> (RawStatus, String) {
    let mut rest = title.trim();
    for prefix in RECENT_PREFIXES {
        if rest.len() >= prefix.len() && rest[..].to_lowercase().starts_with(prefix) {
            rest = trim_separators(&rest[prefix.len()..]);
            break;
        }
    }

    let lower = rest.to_lowercase();
    for (keyword, status) in STATUS_KEYWORDS {
        if lower.starts_with(keyword) {
            let clean = trim_separators(&rest[keyword.len()..]);
            return (*status, unwrap_brackets(clean).to_string());
        }
    }
    (RawStatus::Done, unwrap_brackets(rest).to_string())
}

/// Final three-valued taxonomy.
pub fn bucket_status(raw: RawStatus) -> ConsumeStatus {
    match raw {
        RawStatus::Reading | RawStatus::Watching | RawStatus::Listening => {
            ConsumeStatus::InProgress
        }
        RawStatus::WantToRead | RawStatus::WantToWatch | RawStatus::WantToListen => {
            ConsumeStatus::Wishlist
        }
        RawStatus::Done => ConsumeStatus::Completed,
    }
}

// ---------------------------------------------------------------------------
// Stage 3: rating extraction (precedence chain, first success wins)
// ---------------------------------------------------------------------------

static RE_STAR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:推荐|recommend)\s*[:：]\s*([★☆]+)").expect("star prefix regex"));
static RE_STAR_EOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)([★☆]+)\s*$").expect("star eol regex"));
static RE_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s*/\s*(5|10)\b").expect("numeric rating regex"));

const RATING_WORDS: &[(&str, u8)] = &[
    ("力荐", 5),
    ("推荐", 4),
    ("还行", 3),
    ("较差", 2),
    ("很差", 1),
];

fn count_stars(glyphs: &str) -> (u8, u8) {
    let filled = glyphs.chars().filter(|&c| c == '★').count() as u8;
    (filled.min(5), 5)
}

/// Returns `(rating, max_rating)`. Stages: (a) star glyphs behind a
/// "recommend:" prefix or anchored at end of line, (b) numeric N/5 or
/// N/10, (c) the fixed rating-word vocabulary. Later stages are not
/// attempted once one succeeds.
pub fn extract_rating(text: &str) -> Option<(u8, u8)> {
    if let Some(c) = RE_STAR_PREFIX.captures(text).or_else(|| RE_STAR_EOL.captures(text)) {
        return Some(count_stars(c.get(1).map(|m| m.as_str()).unwrap_or_default()));
    }

    if let Some(c) = RE_NUMERIC.captures(text) {
        let n: u8 = c.get(1)?.as_str().parse().ok()?;
        let max: u8 = c.get(2)?.as_str().parse().ok()?;
        return Some((n.min(max), max));
    }

    for (word, score) in RATING_WORDS {
        if text.contains(word) {
            return Some((*score, 5));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Stage 4: cover image through the hotlink-protecting proxy
// ---------------------------------------------------------------------------

/// The origin enforces hotlink protection keyed on Referer, so covers are
/// routed through the image-proxy endpoint instead of linked directly.
pub fn proxied_cover(raw_markup: &str) -> Option<String> {
    let src = first_img_src(raw_markup)?;
    let encoded: String = url::form_urlencoded::byte_serialize(src.as_bytes()).collect();
    Some(format!("/api/proxy-image?url={encoded}"))
}

// ---------------------------------------------------------------------------
// Stage 5: review text
// ---------------------------------------------------------------------------

static RE_REVIEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:notes|review|短评|笔记)\s*[:：]\s*(.+)").expect("review regex"));

const REVIEW_MAX_CHARS: usize = 200;

pub fn extract_review(stripped_text: &str) -> Option<String> {
    let c = RE_REVIEW.captures(stripped_text)?;
    let body = c.get(1)?.as_str().trim();
    if body.is_empty() {
        return None;
    }
    Some(body.chars().take(REVIEW_MAX_CHARS).collect())
}

// Supplementary best-effort fields.
static RE_CREATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:作者|导演)\s*[:：]\s*([^,，;；/\n]+)").expect("creator regex"));
static RE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[（(]((?:19|20)\d{2})[）)]").expect("year regex"));

fn extract_creator(stripped_text: &str) -> Option<String> {
    RE_CREATOR
        .captures(stripped_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn extract_year(title: &str) -> Option<i32> {
    RE_YEAR
        .captures(title)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ---------------------------------------------------------------------------
// Feed normalization
// ---------------------------------------------------------------------------

/// Pure normalization of one fetched feed document.
pub fn parse_media_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let t0 = std::time::Instant::now();
    let feed = rss::parse(xml).context("parsing media log xml")?;

    let mut out = Vec::with_capacity(feed.channel.items.len());
    for it in feed.channel.items {
        let raw_title = it.title.as_deref().unwrap_or_default();
        if raw_title.trim().is_empty() {
            continue;
        }
        let raw_body = it.description.as_deref().unwrap_or_default();
        let stripped = strip_tags(raw_body);
        let link = it.link.as_deref().unwrap_or_default();

        let media_type = classify_media_type(link, raw_title);
        let (raw_status, clean_title) = extract_status(raw_title);
        let rating = extract_rating(&stripped);
        let published_at = parse_feed_date(it.pub_date.as_deref());

        let id = it
            .stable_id()
            .unwrap_or_else(|| synthesized_id(&[link, &published_at.to_rfc3339(), raw_title]));

        out.push(FeedItem {
            id,
            kind: Kind::Media,
            title: Some(clean_title),
            content: stripped.clone(),
            published_at,
            source: Source::MediaLog,
            url: it.link.clone(),
            cover_image: proxied_cover(raw_body),
            metadata: Metadata::MediaLog(MediaLogMetadata {
                media_type,
                rating: rating.map(|(n, _)| n),
                max_rating: rating.map(|(_, max)| max),
                review: extract_review(&stripped),
                status: bucket_status(raw_status),
                creator: extract_creator(&stripped),
                year: extract_year(raw_title),
            }),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("adapter_parse_ms").record(ms);
    counter!("adapter_items_total").increment(out.len() as u64);
    Ok(out)
}

#[async_trait]
impl SourceAdapter for MediaLogAdapter {
    fn name(&self) -> &'static str {
        "media_log"
    }

    fn source(&self) -> Source {
        Source::MediaLog
    }

    async fn fetch_page(&self, _page_size_hint: usize, _cursor: Option<String>) -> Result<Page> {
        let body = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .context("media log http get")?
            .error_for_status()
            .context("media log http status")?
            .text()
            .await
            .context("media log http body")?;
        Ok(Page::last(parse_media_feed(&body)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_url_namespace() {
        assert_eq!(
            classify_media_type("https://book.example.com/subject/1", "在读某书"),
            MediaType::Book
        );
        assert_eq!(
            classify_media_type("https://music.example.com/subject/2", "听过某专辑"),
            MediaType::Music
        );
        assert_eq!(
            classify_media_type("https://movie.example.com/subject/3", "看过某电影"),
            MediaType::Movie
        );
    }

    #[test]
    fn season_pattern_reclassifies_movie_namespace_as_tv() {
        assert_eq!(
            classify_media_type("https://movie.example.com/subject/4", "在看 新闻编辑室 第二季"),
            MediaType::Tv
        );
        assert_eq!(
            classify_media_type("https://movie.example.com/subject/5", "Watching Severance Season 2"),
            MediaType::Tv
        );
    }

    #[test]
    fn status_keywords_bucket_correctly() {
        let (raw, _) = extract_status("在读《罗生门》");
        assert_eq!(bucket_status(raw), ConsumeStatus::InProgress);

        let (raw, _) = extract_status("想读 哈德良回忆录");
        assert_eq!(bucket_status(raw), ConsumeStatus::Wishlist);

        let (raw, _) = extract_status("罗生门");
        assert_eq!(bucket_status(raw), ConsumeStatus::Completed);
    }

    #[test]
    fn status_keyword_and_recent_prefix_are_stripped_from_title() {
        let (raw, clean) = extract_status("最近在看: 新闻编辑室");
        assert_eq!(raw, RawStatus::Watching);
        assert_eq!(clean, "新闻编辑室");

        let (raw, clean) = extract_status("在读《罗生门》");
        assert_eq!(raw, RawStatus::Reading);
        assert_eq!(clean, "罗生门");

        let (raw, clean) = extract_status("recently watching: The Newsroom");
        assert_eq!(raw, RawStatus::Watching);
        assert_eq!(clean, "The Newsroom");
    }

    #[test]
    fn star_glyphs_win_over_numeric_rating() {
        let text = "推荐: ★★★★☆ 也可以说是 8/10 吧";
        assert_eq!(extract_rating(text), Some((4, 5)));
    }

    #[test]
    fn numeric_rating_parses_both_scales() {
        assert_eq!(extract_rating("solid 4/5"), Some((4, 5)));
        assert_eq!(extract_rating("gave it 8/10 overall"), Some((8, 10)));
    }

    #[test]
    fn rating_word_vocabulary_is_last_resort() {
        assert_eq!(extract_rating("总之力荐"), Some((5, 5)));
        assert_eq!(extract_rating("还行吧"), Some((3, 5)));
        assert_eq!(extract_rating("没有评分"), None);
    }

    #[test]
    fn end_of_line_stars_count_filled_glyphs() {
        assert_eq!(extract_rating("某部电影 ★★★☆☆"), Some((3, 5)));
    }

    #[test]
    fn review_is_labeled_and_truncated() {
        assert_eq!(
            extract_review("短评: 值得一读").as_deref(),
            Some("值得一读")
        );
        let long = format!("review: {}", "x".repeat(300));
        assert_eq!(extract_review(&long).map(|r| r.chars().count()), Some(200));
        assert_eq!(extract_review("no label here"), None);
    }

    #[test]
    fn cover_is_rewritten_through_the_proxy() {
        let html = r#"<img src="https://img9.doubanio.com/view/s123.jpg">"#;
        let cover = proxied_cover(html).expect("cover");
        assert!(cover.starts_with("/api/proxy-image?url="));
        assert!(cover.contains("doubanio.com"));
        assert_eq!(proxied_cover("no image"), None);
    }

    #[test]
    fn feed_items_normalize_with_full_pipeline() {
        let xml = r#"<rss version="2.0"><channel><title>log</title>
            <item>
                <title>在读《挪威的森林》</title>
                <link>https://book.example.com/subject/1</link>
                <guid isPermaLink="false">log-1</guid>
                <pubDate>Mon, 01 Jan 2024 09:00:00 GMT</pubDate>
                <description>&lt;img src="https://img1.doubanio.com/cover.jpg"&gt; 推荐: ★★★★☆ 短评: 很安静的一本</description>
            </item>
        </channel></rss>"#;
        let items = parse_media_feed(xml).expect("parse");
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.kind, Kind::Media);
        assert_eq!(item.title.as_deref(), Some("挪威的森林"));
        match &item.metadata {
            Metadata::MediaLog(m) => {
                assert_eq!(m.media_type, MediaType::Book);
                assert_eq!(m.status, ConsumeStatus::InProgress);
                assert_eq!(m.rating, Some(4));
                assert_eq!(m.max_rating, Some(5));
                assert_eq!(m.review.as_deref(), Some("很安静的一本"));
            }
            other => panic!("expected media metadata, got {other:?}"),
        }
        assert!(item
            .cover_image
            .as_deref()
            .expect("cover")
            .starts_with("/api/proxy-image?url="));
    }
}
