// src/adapters/document_store.rs
//! Document-store adapter (articles + photos).
//!
//! The upstream is a headless-CMS-style API: datasets of records whose
//! fields live in loosely-typed property bags, plus a block tree per
//! record for rich content. Property names are bilingual — every logical
//! property is looked up through an alias list, first non-empty match
//! wins. List/summary fetches never include full content; the block tree
//! is fetched and rendered only when a single article is requested.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::adapters::{parse_feed_date, Page, SourceAdapter};
use crate::env::{
    RuntimeEnv, ENV_DOCSTORE_API_KEY, ENV_DOCSTORE_ARTICLES_DATASET, ENV_DOCSTORE_BASE_URL,
    ENV_DOCSTORE_PHOTOS_DATASET,
};
use crate::model::{
    ArticleMetadata, ExifData, FeedItem, Kind, Metadata, PhotoMetadata, Source,
};

const DEFAULT_BASE_URL: &str = "https://api.docstore.example";

// Bilingual property aliases, fixed priority order.
const TITLE_ALIASES: &[&str] = &["Title", "标题", "Name", "名称"];
const EXCERPT_ALIASES: &[&str] = &["Excerpt", "摘要", "Summary", "简介"];
const TAGS_ALIASES: &[&str] = &["Tags", "标签", "Categories", "分类"];
const FEATURED_ALIASES: &[&str] = &["Featured", "精选", "置顶"];
const COVER_ALIASES: &[&str] = &["Cover", "封面", "Image", "图片"];
const SLUG_ALIASES: &[&str] = &["Slug", "链接"];
const PUBLISHED_ALIASES: &[&str] = &["Published", "发布", "Status", "状态"];
const ALBUM_ALIASES: &[&str] = &["Album", "相册"];
const LOCATION_ALIASES: &[&str] = &["Location", "地点"];
const CAMERA_ALIASES: &[&str] = &["Camera", "相机"];
const LENS_ALIASES: &[&str] = &["Lens", "镜头"];
const ISO_ALIASES: &[&str] = &["ISO", "感光度"];
const SHUTTER_ALIASES: &[&str] = &["Shutter", "快门"];
const APERTURE_ALIASES: &[&str] = &["Aperture", "光圈"];
const FOCAL_ALIASES: &[&str] = &["FocalLength", "焦距"];
const TAKEN_AT_ALIASES: &[&str] = &["TakenAt", "拍摄时间"];
const GPS_ALIASES: &[&str] = &["GPS", "坐标"];

/// Which dataset this instance serves; controls the produced `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Articles,
    Photos,
}

pub struct DocumentStoreAdapter {
    client: reqwest::Client,
    api_key: String,
    dataset_id: String,
    base_url: String,
    dataset: Dataset,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

impl DocumentStoreAdapter {
    /// Build the adapter for one dataset. `None` (with a warning) when the
    /// required configuration is absent — a degraded-feature signal, not
    /// an error.
    pub fn from_env(env: &RuntimeEnv, client: reqwest::Client, dataset: Dataset) -> Option<Self> {
        let dataset_key = match dataset {
            Dataset::Articles => ENV_DOCSTORE_ARTICLES_DATASET,
            Dataset::Photos => ENV_DOCSTORE_PHOTOS_DATASET,
        };
        let api_key = env.resolve(ENV_DOCSTORE_API_KEY);
        let dataset_id = env.resolve(dataset_key);
        match (api_key, dataset_id) {
            (Some(api_key), Some(dataset_id)) => Some(Self {
                client,
                api_key,
                dataset_id,
                base_url: env
                    .resolve(ENV_DOCSTORE_BASE_URL)
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                dataset,
            }),
            _ => {
                warn!(dataset = ?dataset, "document store not configured; adapter disabled");
                None
            }
        }
    }

    async fn query_dataset(&self, page_size: usize, cursor: Option<String>) -> Result<QueryResponse> {
        let url = format!(
            "{}/v1/datasets/{}/query",
            self.base_url.trim_end_matches('/'),
            self.dataset_id
        );
        let mut body = serde_json::json!({
            "page_size": page_size,
            "sorts": [{ "timestamp": "created_time", "direction": "descending" }],
        });
        if let Some(c) = cursor {
            body["start_cursor"] = Value::String(c);
        }
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("document store query request")?
            .error_for_status()
            .context("document store query status")?;
        resp.json::<QueryResponse>()
            .await
            .context("document store query body")
    }

    /// Fetch and render the full block tree for one record. This is the
    /// expensive path; callers cache it per record id.
    pub async fn fetch_content(&self, record_id: &str) -> Result<String> {
        let mut blocks: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/v1/records/{}/blocks?page_size=100",
                self.base_url.trim_end_matches('/'),
                record_id
            );
            if let Some(c) = &cursor {
                url.push_str(&format!("&start_cursor={c}"));
            }
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await
                .context("document store blocks request")?
                .error_for_status()
                .context("document store blocks status")?
                .json::<QueryResponse>()
                .await
                .context("document store blocks body")?;
            blocks.extend(resp.results);
            if !resp.has_more {
                break;
            }
            cursor = resp.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(render_blocks(&blocks))
    }

    fn normalize_record(&self, record: &Value) -> Option<FeedItem> {
        if !record_is_published(record) {
            return None;
        }
        let id = record.get("id")?.as_str()?.to_string();
        let published_at = parse_feed_date(
            record
                .get("created_time")
                .and_then(Value::as_str),
        );
        let props = record.get("properties");

        let title = props.and_then(|p| text_prop(p, TITLE_ALIASES));
        let cover_image = props
            .and_then(|p| url_prop(p, COVER_ALIASES))
            .or_else(|| record_cover(record));

        match self.dataset {
            Dataset::Articles => {
                let slug = props.and_then(|p| text_prop(p, SLUG_ALIASES));
                let excerpt = props
                    .and_then(|p| text_prop(p, EXCERPT_ALIASES))
                    .unwrap_or_default();
                Some(FeedItem {
                    id,
                    kind: Kind::Article,
                    title,
                    content: String::new(),
                    published_at,
                    source: Source::DocumentStore,
                    url: slug.map(|s| format!("/posts/{s}")),
                    cover_image,
                    metadata: Metadata::Article(ArticleMetadata {
                        reading_time_minutes: reading_time_minutes(""),
                        tags: props.map(|p| list_prop(p, TAGS_ALIASES)).unwrap_or_default(),
                        excerpt,
                        featured: props
                            .map(|p| bool_prop(p, FEATURED_ALIASES))
                            .unwrap_or(false),
                    }),
                })
            }
            Dataset::Photos => Some(FeedItem {
                id,
                kind: Kind::Photo,
                title,
                content: String::new(),
                published_at,
                source: Source::DocumentStore,
                url: None,
                cover_image,
                metadata: Metadata::Photo(PhotoMetadata {
                    album: props.and_then(|p| text_prop(p, ALBUM_ALIASES)),
                    location: props.and_then(|p| text_prop(p, LOCATION_ALIASES)),
                    exif: props.and_then(exif_from_props),
                }),
            }),
        }
    }
}

#[async_trait]
impl SourceAdapter for DocumentStoreAdapter {
    fn name(&self) -> &'static str {
        match self.dataset {
            Dataset::Articles => "document_store:articles",
            Dataset::Photos => "document_store:photos",
        }
    }

    fn source(&self) -> Source {
        Source::DocumentStore
    }

    async fn fetch_page(&self, page_size_hint: usize, cursor: Option<String>) -> Result<Page> {
        let resp = self.query_dataset(page_size_hint, cursor).await?;
        let items: Vec<FeedItem> = resp
            .results
            .iter()
            .filter_map(|r| self.normalize_record(r))
            .collect();
        counter!("adapter_items_total").increment(items.len() as u64);
        Ok(Page {
            items,
            has_more: resp.has_more,
            next_cursor: resp.next_cursor,
        })
    }
}

fn record_is_published(record: &Value) -> bool {
    let Some(props) = record.get("properties") else {
        return false;
    };
    for alias in PUBLISHED_ALIASES {
        let Some(prop) = props.get(*alias) else {
            continue;
        };
        // checkbox-style flag
        if let Some(b) = prop.get("checkbox").and_then(Value::as_bool).or(prop.as_bool()) {
            return b;
        }
        // select-style status
        if let Some(name) = prop
            .get("select")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
        {
            return matches!(name, "Published" | "已发布");
        }
    }
    false
}

fn record_cover(record: &Value) -> Option<String> {
    let cover = record.get("cover")?;
    file_url(cover)
}

/// `{file: {url}}` / `{external: {url}}` / plain string.
fn file_url(v: &Value) -> Option<String> {
    if let Some(s) = v.as_str() {
        return non_empty(s);
    }
    for key in ["file", "external"] {
        if let Some(url) = v.get(key).and_then(|f| f.get("url")).and_then(Value::as_str) {
            return non_empty(url);
        }
    }
    None
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// Concatenate the plain text of a rich-text span array.
fn rich_text_plain(spans: &Value) -> String {
    let Some(arr) = spans.as_array() else {
        return String::new();
    };
    arr.iter()
        .map(|span| {
            span.get("plain_text")
                .and_then(Value::as_str)
                .or_else(|| {
                    span.get("text")
                        .and_then(|t| t.get("content"))
                        .and_then(Value::as_str)
                })
                .unwrap_or_default()
        })
        .collect()
}

/// First alias whose property yields non-empty text.
fn text_prop(props: &Value, aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        let Some(prop) = props.get(*alias) else {
            continue;
        };
        let text = if let Some(s) = prop.as_str() {
            s.to_string()
        } else if let Some(spans) = prop.get("title").or_else(|| prop.get("rich_text")) {
            rich_text_plain(spans)
        } else if let Some(s) = prop.get("select").and_then(|s| s.get("name")).and_then(Value::as_str) {
            s.to_string()
        } else {
            continue;
        };
        if let Some(t) = non_empty(&text) {
            return Some(t);
        }
    }
    None
}

/// First alias whose property yields a non-empty string list.
fn list_prop(props: &Value, aliases: &[&str]) -> Vec<String> {
    for alias in aliases {
        let Some(prop) = props.get(*alias) else {
            continue;
        };
        let arr = prop
            .get("multi_select")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .or_else(|| {
                prop.as_array().map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
            });
        if let Some(list) = arr {
            if !list.is_empty() {
                return list;
            }
        }
    }
    Vec::new()
}

fn bool_prop(props: &Value, aliases: &[&str]) -> bool {
    for alias in aliases {
        let Some(prop) = props.get(*alias) else {
            continue;
        };
        if let Some(b) = prop.get("checkbox").and_then(Value::as_bool).or(prop.as_bool()) {
            return b;
        }
    }
    false
}

fn url_prop(props: &Value, aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        let Some(prop) = props.get(*alias) else {
            continue;
        };
        if let Some(u) = prop.get("url").and_then(Value::as_str).and_then(non_empty) {
            return Some(u);
        }
        if let Some(files) = prop.get("files").and_then(Value::as_array) {
            if let Some(u) = files.first().and_then(file_url) {
                return Some(u);
            }
        }
        if let Some(u) = prop.as_str().and_then(non_empty) {
            return Some(u);
        }
    }
    None
}

fn number_prop(props: &Value, aliases: &[&str]) -> Option<f64> {
    for alias in aliases {
        let Some(prop) = props.get(*alias) else {
            continue;
        };
        if let Some(n) = prop.get("number").and_then(Value::as_f64).or(prop.as_f64()) {
            return Some(n);
        }
    }
    None
}

fn exif_from_props(props: &Value) -> Option<ExifData> {
    let exif = ExifData {
        camera: text_prop(props, CAMERA_ALIASES),
        lens: text_prop(props, LENS_ALIASES),
        iso: number_prop(props, ISO_ALIASES).map(|n| n as u32),
        shutter_speed: text_prop(props, SHUTTER_ALIASES),
        aperture: text_prop(props, APERTURE_ALIASES),
        focal_length_mm: number_prop(props, FOCAL_ALIASES).map(|n| n as f32),
        taken_at: text_prop(props, TAKEN_AT_ALIASES).map(|t| parse_feed_date(Some(&t))),
        gps_coordinates: text_prop(props, GPS_ALIASES),
    };
    (exif != ExifData::default()).then_some(exif)
}

// ---------------------------------------------------------------------------
// Block tree → semantic markup
// ---------------------------------------------------------------------------

/// Render inline spans with annotation wrapping. Each annotation wraps the
/// accumulated string exactly once, in a fixed order regardless of how the
/// upstream ordered them.
fn render_rich_text(spans: &Value) -> String {
    let Some(arr) = spans.as_array() else {
        return String::new();
    };
    let mut out = String::new();
    for span in arr {
        let raw = span
            .get("plain_text")
            .and_then(Value::as_str)
            .or_else(|| {
                span.get("text")
                    .and_then(|t| t.get("content"))
                    .and_then(Value::as_str)
            })
            .unwrap_or_default();
        let mut text = html_escape::encode_text(raw).to_string();

        let ann = span.get("annotations");
        let has = |name: &str| {
            ann.and_then(|a| a.get(name))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        if has("code") {
            text = format!("<code>{text}</code>");
        }
        if has("bold") {
            text = format!("<strong>{text}</strong>");
        }
        if has("italic") {
            text = format!("<em>{text}</em>");
        }
        if has("strikethrough") {
            text = format!("<s>{text}</s>");
        }
        if has("underline") {
            text = format!("<u>{text}</u>");
        }
        let href = span
            .get("href")
            .and_then(Value::as_str)
            .or_else(|| {
                span.get("text")
                    .and_then(|t| t.get("link"))
                    .and_then(|l| l.get("url"))
                    .and_then(Value::as_str)
            });
        if let Some(href) = href {
            let href = html_escape::encode_double_quoted_attribute(href);
            text = format!("<a href=\"{href}\">{text}</a>");
        }
        out.push_str(&text);
    }
    out
}

fn block_rich_text(block: &Value, block_type: &str) -> String {
    block
        .get(block_type)
        .and_then(|b| b.get("rich_text"))
        .map(render_rich_text)
        .unwrap_or_default()
}

/// Recursive structural conversion: each upstream block type maps to
/// exactly one markup element. Unrecognized types degrade to a plain
/// paragraph when any text is extractable, else are skipped.
pub fn render_blocks(blocks: &[Value]) -> String {
    let mut out = String::new();
    for block in blocks {
        let Some(block_type) = block.get("type").and_then(Value::as_str) else {
            continue;
        };
        match block_type {
            "paragraph" => {
                out.push_str(&format!("<p>{}</p>", block_rich_text(block, "paragraph")));
            }
            "heading_1" | "heading_2" | "heading_3" => {
                let level = &block_type[block_type.len() - 1..];
                let text = block_rich_text(block, block_type);
                out.push_str(&format!("<h{level}>{text}</h{level}>"));
            }
            "bulleted_list_item" | "numbered_list_item" => {
                out.push_str(&format!("<li>{}</li>", block_rich_text(block, block_type)));
            }
            "quote" => {
                out.push_str(&format!(
                    "<blockquote>{}</blockquote>",
                    block_rich_text(block, "quote")
                ));
            }
            "code" => {
                let lang = block
                    .get("code")
                    .and_then(|c| c.get("language"))
                    .and_then(Value::as_str)
                    .unwrap_or("plain");
                let lang = html_escape::encode_double_quoted_attribute(lang);
                let text = block_rich_text(block, "code");
                out.push_str(&format!(
                    "<pre><code class=\"language-{lang}\">{text}</code></pre>"
                ));
            }
            "image" => {
                let Some(src) = block.get("image").and_then(file_url) else {
                    continue;
                };
                let src = html_escape::encode_double_quoted_attribute(&src);
                let caption = block
                    .get("image")
                    .and_then(|i| i.get("caption"))
                    .map(render_rich_text)
                    .unwrap_or_default();
                if caption.is_empty() {
                    out.push_str(&format!("<figure><img src=\"{src}\"></figure>"));
                } else {
                    out.push_str(&format!(
                        "<figure><img src=\"{src}\"><figcaption>{caption}</figcaption></figure>"
                    ));
                }
            }
            "divider" => out.push_str("<hr>"),
            "callout" => {
                out.push_str(&format!(
                    "<aside class=\"callout\">{}</aside>",
                    block_rich_text(block, "callout")
                ));
            }
            // Summary text only; nested children stay collapsed.
            "toggle" => {
                out.push_str(&format!(
                    "<details><summary>{}</summary></details>",
                    block_rich_text(block, "toggle")
                ));
            }
            other => {
                let text = block_rich_text(block, other);
                if !text.trim().is_empty() {
                    out.push_str(&format!("<p>{text}</p>"));
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Reading time
// ---------------------------------------------------------------------------

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
    )
}

/// CJK ideographs read at ~400/min, space-delimited words at ~200/min;
/// minimum one minute.
pub fn reading_time_minutes(content: &str) -> u32 {
    let text = crate::adapters::strip_tags(content);
    let mut cjk = 0usize;
    let mut rest = String::with_capacity(text.len());
    for c in text.chars() {
        if is_cjk(c) {
            cjk += 1;
            rest.push(' ');
        } else {
            rest.push(c);
        }
    }
    let words = rest.split_whitespace().count();
    let minutes = (cjk as f64 / 400.0 + words as f64 / 200.0).ceil();
    (minutes as u32).max(1)
}

/// Site-relative slug of an article entity, if it carries one.
pub fn slug_of(item: &FeedItem) -> Option<&str> {
    item.url.as_deref()?.strip_prefix("/posts/")
}
