//! RSS 2.0 (and the loose RSS 0.9x family) extraction.

use super::detect::FeedFormat;
use super::parser::{ParsedFeed, ParsedItem};
use super::xml::{Field, FieldTags, XmlDocument, XmlElement};
use crate::util::build_snippet;

const RSS_FIELDS: FieldTags = FieldTags::new(&[
    (Field::Title, &["title"]),
    (Field::Link, &["link", "guid"]),
    (Field::Description, &["description"]),
    (
        Field::Content,
        &["content:encoded", "encoded", "content", "description"],
    ),
    (Field::Summary, &["description"]),
    (Field::Author, &["dc:creator", "creator", "author"]),
    (Field::Published, &["isoDate", "pubDate", "dc:date"]),
]);

pub(crate) fn parse(doc: &XmlDocument) -> ParsedFeed {
    // Channel-less documents are searched as a whole.
    let scope = doc
        .as_element()
        .find_first("channel")
        .or_else(|| doc.root())
        .unwrap_or_else(|| doc.as_element());

    let mut feed = ParsedFeed::empty(FeedFormat::Rss2);
    feed.title = RSS_FIELDS.text(scope, Field::Title);
    feed.link = RSS_FIELDS.text(scope, Field::Link);
    feed.description = RSS_FIELDS.text(scope, Field::Description);

    for (position, item) in scope.descendants_named("item").into_iter().enumerate() {
        feed.push_item(position, parse_item(item));
    }
    feed
}

fn parse_item(item: &XmlElement) -> Option<ParsedItem> {
    let content_url = RSS_FIELDS.text(item, Field::Link)?;
    let content = RSS_FIELDS.content(item, Field::Content);
    let summary = RSS_FIELDS.raw(item, Field::Summary);

    Some(ParsedItem {
        content_snippet: build_snippet(content.as_deref(), summary.as_deref()),
        content_url,
        title: RSS_FIELDS.text(item, Field::Title),
        content,
        author: RSS_FIELDS.text(item, Field::Author),
        published_at: RSS_FIELDS.timestamp(item, Field::Published),
    })
}
