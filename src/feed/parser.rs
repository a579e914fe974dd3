use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::detect::{detect_format, FeedFormat};
use super::xml::XmlDocument;
use super::{atom, rdf, rss};

/// Errors that abort parsing of a whole payload.
///
/// Item-level problems never surface here: an item without a resolvable URL
/// is dropped and counted in [`ParsedFeed::skipped`].
#[derive(Error, Debug)]
pub enum FeedParseError {
    /// The payload contains no XML element at all.
    #[error("Payload contains no XML document")]
    NoDocument,
}

/// A feed normalized out of any of the supported dialects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedFeed {
    pub format: FeedFormat,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub items: Vec<ParsedItem>,
    /// Items dropped because no URL could be resolved for them.
    pub skipped: usize,
}

/// A single content entry. `content_url` is always non-empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedItem {
    pub content_url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_snippet: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ParsedFeed {
    pub(crate) fn empty(format: FeedFormat) -> Self {
        Self {
            format,
            title: None,
            link: None,
            description: None,
            items: Vec::new(),
            skipped: 0,
        }
    }

    /// Keeps an item that resolved, counts one that did not.
    pub(crate) fn push_item(&mut self, position: usize, item: Option<ParsedItem>) {
        match item {
            Some(item) => self.items.push(item),
            None => {
                self.skipped += 1;
                tracing::debug!(
                    format = ?self.format,
                    position,
                    "Dropping item without a resolvable URL"
                );
            }
        }
    }
}

/// Parses a feed payload in any supported dialect.
///
/// The dialect is chosen by [`detect_format`]; the payload is then read into
/// a tolerant tree and handed to the matching extractor. Malformed XML
/// degrades to whatever could be read, possibly an empty item list. Only a
/// payload with no element at all is an error.
///
/// # Examples
///
/// ```
/// use feedmill::feed::{parse_feed, FeedFormat};
///
/// let feed = parse_feed(
///     "<rss><channel><title>News</title>\
///      <item><title>A</title><link>https://example.com/a</link></item>\
///      </channel></rss>",
/// )
/// .unwrap();
/// assert_eq!(feed.format, FeedFormat::Rss2);
/// assert_eq!(feed.title.as_deref(), Some("News"));
/// assert_eq!(feed.items[0].content_url, "https://example.com/a");
///
/// assert!(parse_feed("not xml at all").is_err());
/// ```
pub fn parse_feed(xml: &str) -> Result<ParsedFeed, FeedParseError> {
    let format = detect_format(xml);
    let doc = XmlDocument::parse(xml);
    if doc.root().is_none() {
        return Err(FeedParseError::NoDocument);
    }

    let feed = match format {
        FeedFormat::Atom => atom::parse(&doc),
        FeedFormat::Rdf => rdf::parse(&doc),
        FeedFormat::Rss2 => rss::parse(&doc),
    };

    tracing::debug!(
        format = ?feed.format,
        items = feed.items.len(),
        skipped = feed.skipped,
        "Parsed feed"
    );
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_payload_is_no_document() {
        assert!(matches!(parse_feed(""), Err(FeedParseError::NoDocument)));
        assert!(matches!(
            parse_feed("   \n  "),
            Err(FeedParseError::NoDocument)
        ));
    }

    #[test]
    fn test_html_error_page_degrades_to_empty_feed() {
        let feed = parse_feed("<html><body><h1>502 Bad Gateway</h1></body></html>").unwrap();
        assert_eq!(feed.format, FeedFormat::Rss2);
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_dispatches_each_dialect() {
        let atom = parse_feed(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><id>urn:1</id><link href="http://x/1"/></entry></feed>"#,
        )
        .unwrap();
        assert_eq!(atom.format, FeedFormat::Atom);
        assert_eq!(atom.items.len(), 1);

        let rdf = parse_feed(
            r#"<rdf:RDF><item rdf:about="http://x/2"><title>t</title></item></rdf:RDF>"#,
        )
        .unwrap();
        assert_eq!(rdf.format, FeedFormat::Rdf);
        assert_eq!(rdf.items[0].content_url, "http://x/2");
    }

    #[test]
    fn test_push_item_counts_skips() {
        let mut feed = ParsedFeed::empty(FeedFormat::Rss2);
        feed.push_item(0, None);
        feed.push_item(
            1,
            Some(ParsedItem {
                content_url: "http://x/1".into(),
                title: None,
                content: None,
                content_snippet: None,
                author: None,
                published_at: None,
            }),
        );
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.skipped, 1);
    }
}
