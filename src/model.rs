// src/model.rs
//! Unified entity model produced by every source adapter.
//!
//! `kind` is a closed tag that determines which metadata variant an entity
//! carries; the aggregator never mutates entities, only re-orders arrays.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Canonical entity all adapters normalize into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    /// Upstream-native identifier, or a deterministic synthesized fallback.
    pub id: String,
    pub kind: Kind,
    /// Absent for short-form microblog posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Rendered markup (articles) or plain text (microblogs). Empty string
    /// is valid and distinct from absent.
    pub content: String,
    pub published_at: DateTime<Utc>,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Article,
    Microblog,
    Media,
    Photo,
}

/// Provenance tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    DocumentStore,
    MessagingChannel,
    MediaLog,
    GenericFeed,
}

/// Per-kind metadata. Untagged on the wire — the owning item's `kind`
/// already tags it. Variant order matters for deserialization: `Photo` has
/// only optional fields and must be tried last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metadata {
    Article(ArticleMetadata),
    Microblog(MicroblogMetadata),
    MediaLog(MediaLogMetadata),
    Photo(PhotoMetadata),
}

impl Metadata {
    /// Whether this variant is the one `kind` requires.
    pub fn matches_kind(&self, kind: Kind) -> bool {
        matches!(
            (self, kind),
            (Metadata::Article(_), Kind::Article)
                | (Metadata::Microblog(_), Kind::Microblog)
                | (Metadata::MediaLog(_), Kind::Media)
                | (Metadata::Photo(_), Kind::Photo)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMetadata {
    pub reading_time_minutes: u32,
    pub tags: Vec<String>,
    pub excerpt: String,
    pub featured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroblogMetadata {
    pub platform: String,
    pub channel_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u32>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaLogMetadata {
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    pub status: ConsumeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Book,
    Movie,
    Tv,
    Music,
    Game,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeStatus {
    Completed,
    InProgress,
    Wishlist,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exif: Option<ExifData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length_mm: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_coordinates: Option<String>,
}

/// One year of the archive view. Purely a projection of the article set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveGroup {
    pub year: i32,
    pub items: Vec<ArchiveEntry>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub published_at: DateTime<Utc>,
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// "Currently consuming" sidebar projection of an in-progress media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentItem {
    pub id: String,
    pub title: String,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rating: Option<u8>,
}

/// Group articles by calendar year, newest year first, newest entry first
/// within each year. Idempotent over the same input set.
pub fn archive_groups(items: &[FeedItem]) -> Vec<ArchiveGroup> {
    let mut sorted: Vec<&FeedItem> = items.iter().collect();
    sorted.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let mut groups: Vec<ArchiveGroup> = Vec::new();
    for it in sorted {
        let year = it.published_at.year();
        let entry = ArchiveEntry {
            id: it.id.clone(),
            title: it.title.clone(),
            published_at: it.published_at,
            kind: it.kind,
            url: it.url.clone(),
        };
        match groups.last_mut() {
            Some(g) if g.year == year => {
                g.items.push(entry);
                g.count += 1;
            }
            _ => groups.push(ArchiveGroup {
                year,
                items: vec![entry],
                count: 1,
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(id: &str, ts: &str) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            kind: Kind::Article,
            title: Some(format!("post {id}")),
            content: String::new(),
            published_at: ts.parse().expect("test timestamp"),
            source: Source::DocumentStore,
            url: None,
            cover_image: None,
            metadata: Metadata::Article(ArticleMetadata {
                reading_time_minutes: 1,
                tags: vec![],
                excerpt: String::new(),
                featured: false,
            }),
        }
    }

    #[test]
    fn archive_groups_by_year_descending() {
        let items = vec![
            article("a", "2023-03-01T00:00:00Z"),
            article("b", "2024-06-01T00:00:00Z"),
            article("c", "2024-01-01T00:00:00Z"),
        ];
        let groups = archive_groups(&items);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].year, 2024);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].items[0].id, "b");
        assert_eq!(groups[1].year, 2023);
        assert_eq!(groups[1].items[0].id, "a");
    }

    #[test]
    fn archive_grouping_is_idempotent() {
        let items = vec![
            article("a", "2022-03-01T10:00:00Z"),
            article("b", "2022-03-01T09:00:00Z"),
            article("c", "2021-12-31T23:59:59Z"),
        ];
        let once = archive_groups(&items);
        let twice = archive_groups(&items);
        assert_eq!(once, twice);
    }

    #[test]
    fn metadata_roundtrips_through_json_with_dates_revived() {
        let item = article("rt", "2024-05-05T12:00:00Z");
        let json = serde_json::to_string(&item).expect("serialize");
        let back: FeedItem = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, item);
        assert_eq!(
            back.published_at,
            Utc.with_ymd_and_hms(2024, 5, 5, 12, 0, 0).unwrap()
        );
        assert!(back.metadata.matches_kind(back.kind));
    }

    #[test]
    fn untagged_metadata_picks_correct_variant() {
        let media = Metadata::MediaLog(MediaLogMetadata {
            media_type: MediaType::Book,
            rating: Some(4),
            max_rating: Some(5),
            review: None,
            status: ConsumeStatus::InProgress,
            creator: None,
            year: None,
        });
        let json = serde_json::to_string(&media).expect("serialize");
        let back: Metadata = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, media);

        let photo = Metadata::Photo(PhotoMetadata::default());
        let json = serde_json::to_string(&photo).expect("serialize");
        let back: Metadata = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, photo);
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let item = article("wire", "2024-01-01T00:00:00Z");
        let v: serde_json::Value = serde_json::to_value(&item).expect("to_value");
        assert!(v.get("publishedAt").is_some());
        assert!(v["metadata"].get("readingTimeMinutes").is_some());
    }
}
