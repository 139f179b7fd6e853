// tests/providers_channel_feed.rs
use feed_aggregator::adapters::channel_feed::parse_channel_feed;
use feed_aggregator::model::{AttachmentKind, Kind, Metadata, Source};

const CHANNEL_XML: &str = include_str!("fixtures/channel_feed.xml");

#[test]
fn channel_fixture_skips_empty_items_and_keeps_the_rest() {
    let items = parse_channel_feed(CHANNEL_XML).expect("channel fixture parse ok");
    // the third item has neither text nor an image and is dropped
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.kind == Kind::Microblog));
    assert!(items.iter().all(|i| i.source == Source::MessagingChannel));
    assert!(items.iter().all(|i| i.title.is_none()));
}

#[test]
fn channel_fixture_carries_the_clean_channel_name() {
    let items = parse_channel_feed(CHANNEL_XML).expect("channel fixture parse ok");
    for item in &items {
        match &item.metadata {
            Metadata::Microblog(m) => {
                assert_eq!(m.platform, "telegram");
                assert_eq!(m.channel_name, "白噪音");
            }
            other => panic!("expected microblog metadata, got {other:?}"),
        }
    }
}

#[test]
fn channel_fixture_surfaces_the_embedded_image_twice() {
    let items = parse_channel_feed(CHANNEL_XML).expect("channel fixture parse ok");

    let with_image = &items[0];
    assert_eq!(
        with_image.cover_image.as_deref(),
        Some("https://cdn.tg.example/river.jpg")
    );
    match &with_image.metadata {
        Metadata::Microblog(m) => {
            assert_eq!(m.attachments.len(), 1);
            assert_eq!(m.attachments[0].kind, AttachmentKind::Image);
            assert_eq!(m.attachments[0].url, "https://cdn.tg.example/river.jpg");
        }
        other => panic!("expected microblog metadata, got {other:?}"),
    }

    let text_only = &items[1];
    assert_eq!(text_only.cover_image, None);
    assert_eq!(text_only.content, "早。");
    // no guid: the link doubles as the stable id
    assert_eq!(text_only.id, "https://t.me/whitenoise/119");
}
