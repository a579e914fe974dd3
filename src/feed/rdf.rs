//! RSS 1.0 / RDF extraction.
//!
//! RDF feeds keep their `<item>` elements beside the `<channel>` rather than
//! inside it, so items are collected from anywhere below the root.

use super::detect::FeedFormat;
use super::parser::{ParsedFeed, ParsedItem};
use super::xml::{Field, FieldTags, XmlDocument, XmlElement};
use crate::util::{build_snippet, normalize_content, normalize_text, sanitize_html};

const RDF_FIELDS: FieldTags = FieldTags::new(&[
    (Field::Title, &["title", "dc:title"]),
    (Field::Link, &["link"]),
    (Field::Description, &["description", "dc:description"]),
    (Field::Author, &["dc:creator", "creator"]),
    (Field::Published, &["dc:date", "date"]),
]);

pub(crate) fn parse(doc: &XmlDocument) -> ParsedFeed {
    let root = doc
        .as_element()
        .find_first("rdf:RDF")
        .or_else(|| doc.as_element().find_first("RDF"))
        .or_else(|| doc.root())
        .unwrap_or_else(|| doc.as_element());

    let mut feed = ParsedFeed::empty(FeedFormat::Rdf);
    if let Some(channel) = root.find_first("channel") {
        feed.title = RDF_FIELDS.text(channel, Field::Title);
        feed.link = RDF_FIELDS.text(channel, Field::Link);
        feed.description = RDF_FIELDS.text(channel, Field::Description);
    }

    for (position, item) in root.descendants_named("item").into_iter().enumerate() {
        feed.push_item(position, parse_item(item));
    }
    feed
}

fn parse_item(item: &XmlElement) -> Option<ParsedItem> {
    let content_url = RDF_FIELDS
        .text(item, Field::Link)
        .or_else(|| item.attr("rdf:about").and_then(normalize_text))?;

    // Descriptions arrive as untrusted HTML; sanitize before storing.
    let content = RDF_FIELDS
        .resolve(item, Field::Description, |child| normalize_content(&child.value()))
        .and_then(|description| sanitize_html(&description));

    Some(ParsedItem {
        content_snippet: build_snippet(content.as_deref(), None),
        content_url,
        title: RDF_FIELDS.text(item, Field::Title),
        content,
        author: RDF_FIELDS.text(item, Field::Author),
        published_at: RDF_FIELDS.timestamp(item, Field::Published),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn parse_str(xml: &str) -> ParsedFeed {
        parse(&XmlDocument::parse(xml))
    }

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dc="http://purl.org/dc/elements/1.1/"
         xmlns="http://purl.org/rss/1.0/">
  <channel rdf:about="http://example.org/">
    <title>RDF Site</title>
    <link>http://example.org/</link>
    <description>Classic RSS 1.0</description>
    <items><rdf:Seq><rdf:li rdf:resource="http://example.org/1"/></rdf:Seq></items>
  </channel>
  <item rdf:about="http://example.org/1">
    <title>First</title>
    <link>http://example.org/1</link>
    <description>&lt;p onclick="x()"&gt;Hello&lt;/p&gt;&lt;script&gt;bad()&lt;/script&gt;</description>
    <dc:creator>Alice</dc:creator>
    <dc:date>2024-01-01T00:00:00Z</dc:date>
  </item>
  <item rdf:about="http://example.org/2">
    <title>Second</title>
  </item>
</rdf:RDF>"#;

    #[test]
    fn test_channel_metadata() {
        let feed = parse_str(SAMPLE);
        assert_eq!(feed.title.as_deref(), Some("RDF Site"));
        assert_eq!(feed.link.as_deref(), Some("http://example.org/"));
        assert_eq!(feed.description.as_deref(), Some("Classic RSS 1.0"));
    }

    #[test]
    fn test_items_outside_channel() {
        let feed = parse_str(SAMPLE);
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.content_url, "http://example.org/1");
        assert_eq!(first.title.as_deref(), Some("First"));
        assert_eq!(first.author.as_deref(), Some("Alice"));
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_description_sanitized() {
        let feed = parse_str(SAMPLE);
        let first = &feed.items[0];
        assert_eq!(first.content.as_deref(), Some("<p>Hello</p>"));
        assert_eq!(first.content_snippet.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_about_attribute_used_when_link_missing() {
        let feed = parse_str(SAMPLE);
        assert_eq!(feed.items[1].content_url, "http://example.org/2");
        assert_eq!(feed.items[1].content, None);
        assert_eq!(feed.items[1].content_snippet, None);
    }

    #[test]
    fn test_item_without_link_or_about_dropped() {
        let feed = parse_str("<rdf:RDF><item><title>orphan</title></item></rdf:RDF>");
        assert!(feed.items.is_empty());
        assert_eq!(feed.skipped, 1);
    }

    #[test]
    fn test_bare_rdf_root() {
        let feed = parse_str("<RDF><item><link>http://x/1</link></item></RDF>");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.title, None);
    }
}
