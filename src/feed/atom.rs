//! Atom 1.0 extraction.

use super::detect::FeedFormat;
use super::parser::{ParsedFeed, ParsedItem};
use super::xml::{Field, FieldTags, XmlDocument, XmlElement};
use crate::util::{build_snippet, normalize_text, present};

const ATOM_FIELDS: FieldTags = FieldTags::new(&[
    (Field::Title, &["title"]),
    (Field::Id, &["id"]),
    (Field::Description, &["subtitle"]),
    (Field::Content, &["content", "summary"]),
    (Field::Summary, &["summary"]),
    (Field::Published, &["published", "updated"]),
]);

pub(crate) fn parse(doc: &XmlDocument) -> ParsedFeed {
    let scope = doc
        .as_element()
        .find_first("feed")
        .or_else(|| doc.root())
        .unwrap_or_else(|| doc.as_element());

    let mut feed = ParsedFeed::empty(FeedFormat::Atom);
    feed.title = ATOM_FIELDS.text(scope, Field::Title);
    feed.link = preferred_link(scope);
    feed.description = ATOM_FIELDS.text(scope, Field::Description);

    let feed_author = author_name(scope);
    for (position, entry) in scope.descendants_named("entry").into_iter().enumerate() {
        feed.push_item(position, parse_entry(entry, feed_author.as_deref()));
    }
    feed
}

fn parse_entry(entry: &XmlElement, feed_author: Option<&str>) -> Option<ParsedItem> {
    let content_url = preferred_link(entry).or_else(|| ATOM_FIELDS.text(entry, Field::Id))?;
    let content = ATOM_FIELDS.content(entry, Field::Content);
    let summary = ATOM_FIELDS.raw(entry, Field::Summary);

    Some(ParsedItem {
        content_snippet: build_snippet(content.as_deref(), summary.as_deref()),
        content_url,
        title: ATOM_FIELDS.text(entry, Field::Title),
        content,
        author: author_name(entry).or_else(|| feed_author.map(str::to_owned)),
        published_at: ATOM_FIELDS.timestamp(entry, Field::Published),
    })
}

/// Picks a link among the element's `<link>` children: the first
/// `rel="alternate"`, then the first without a `rel`, then the first of any
/// relation.
fn preferred_link(element: &XmlElement) -> Option<String> {
    let links: Vec<&XmlElement> = element.children_named("link").collect();

    links
        .iter()
        .filter(|link| rel(link) == Some("alternate"))
        .find_map(|link| link_target(link))
        .or_else(|| {
            links
                .iter()
                .filter(|link| rel(link).is_none())
                .find_map(|link| link_target(link))
        })
        .or_else(|| links.iter().find_map(|link| link_target(link)))
}

fn rel(link: &XmlElement) -> Option<&str> {
    link.attr("rel").and_then(present)
}

/// `href`, or the element text for generators that write links RSS-style.
fn link_target(link: &XmlElement) -> Option<String> {
    link.attr("href")
        .and_then(normalize_text)
        .or_else(|| normalize_text(&link.value()))
}

fn author_name(element: &XmlElement) -> Option<String> {
    element
        .children_named("author")
        .filter_map(|author| author.child("name"))
        .find_map(|name| normalize_text(&name.value()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn parse_str(xml: &str) -> ParsedFeed {
        parse(&XmlDocument::parse(xml))
    }

    #[test]
    fn test_alternate_link_preferred_over_self() {
        let feed = parse_str(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
<title>E</title>
<link rel="self" href="http://x/self"/>
<link rel="alternate" href="http://x/alt"/>
</entry></feed>"#,
        );
        assert_eq!(feed.items[0].content_url, "http://x/alt");
    }

    #[test]
    fn test_link_without_rel_before_other_rels() {
        let feed = parse_str(
            r#"<feed><entry>
<link rel="enclosure" href="http://x/audio.mp3"/>
<link href="http://x/plain"/>
</entry></feed>"#,
        );
        assert_eq!(feed.items[0].content_url, "http://x/plain");
    }

    #[test]
    fn test_any_rel_before_id() {
        let feed = parse_str(
            r#"<feed><entry><id>urn:uuid:1</id><link rel="replies" href="http://x/c"/></entry></feed>"#,
        );
        assert_eq!(feed.items[0].content_url, "http://x/c");
    }

    #[test]
    fn test_id_fallback_and_drop() {
        let feed = parse_str(
            "<feed><entry><id>tag:example.com,2024:1</id></entry><entry><title>none</title></entry></feed>",
        );
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].content_url, "tag:example.com,2024:1");
        assert_eq!(feed.skipped, 1);
    }

    #[test]
    fn test_feed_metadata() {
        let feed = parse_str(
            r#"<feed xmlns="http://www.w3.org/2005/Atom">
<title>Blog</title><subtitle>Thoughts</subtitle>
<link rel="self" href="http://x/feed.atom"/><link rel="alternate" href="http://x/"/>
<entry><title>Entry title</title><link href="http://x/1"/></entry>
</feed>"#,
        );
        assert_eq!(feed.title.as_deref(), Some("Blog"));
        assert_eq!(feed.description.as_deref(), Some("Thoughts"));
        assert_eq!(feed.link.as_deref(), Some("http://x/"));
    }

    #[test]
    fn test_content_summary_and_snippet() {
        let feed = parse_str(
            r#"<feed><entry><link href="http://x/1"/>
<summary>Short</summary>
<content type="html">&lt;p&gt;Long &lt;b&gt;body&lt;/b&gt;&lt;/p&gt;</content>
</entry></feed>"#,
        );
        let item = &feed.items[0];
        assert_eq!(item.content.as_deref(), Some("<p>Long <b>body</b></p>"));
        assert_eq!(item.content_snippet.as_deref(), Some("Short"));
    }

    #[test]
    fn test_summary_used_as_content_fallback() {
        let feed = parse_str(
            r#"<feed><entry><link href="http://x/1"/><summary>Only summary</summary></entry></feed>"#,
        );
        let item = &feed.items[0];
        assert_eq!(item.content.as_deref(), Some("Only summary"));
        assert_eq!(item.content_snippet.as_deref(), Some("Only summary"));
    }

    #[test]
    fn test_xhtml_content_keeps_markup() {
        let feed = parse_str(
            r#"<feed><entry><link href="http://x/1"/>
<content type="xhtml"><div><p>Hello <em>world</em></p></div></content>
</entry></feed>"#,
        );
        let item = &feed.items[0];
        assert_eq!(
            item.content.as_deref(),
            Some("<div><p>Hello <em>world</em></p></div>")
        );
        assert_eq!(item.content_snippet.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_published_then_updated() {
        let feed = parse_str(
            "<feed>\
             <entry><link href=\"http://x/1\"/><updated>2024-01-02T00:00:00Z</updated>\
             <published>2024-01-01T00:00:00Z</published></entry>\
             <entry><link href=\"http://x/2\"/><updated>2024-01-03T00:00:00Z</updated></entry>\
             </feed>",
        );
        assert_eq!(
            feed.items[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            feed.items[1].published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_author_falls_back_to_feed_author() {
        let feed = parse_str(
            "<feed><author><name>Feed Owner</name></author>\
             <entry><link href=\"http://x/1\"/><author><name>Guest</name></author></entry>\
             <entry><link href=\"http://x/2\"/></entry>\
             </feed>",
        );
        assert_eq!(feed.items[0].author.as_deref(), Some("Guest"));
        assert_eq!(feed.items[1].author.as_deref(), Some("Feed Owner"));
    }
}
