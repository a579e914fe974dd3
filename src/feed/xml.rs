//! Tolerant XML tree used by every dialect parser.
//!
//! Feeds in the wild are routinely malformed: mismatched end tags, unescaped
//! HTML inside `<description>`, truncated bodies. Instead of failing, the
//! builder here keeps whatever structure it managed to read:
//!
//! - End tags are matched against the open-element stack by name; unknown end
//!   tags are ignored and skipped-over elements are closed implicitly.
//! - A syntax error stops reading, and everything read so far is kept.
//! - Text is stored raw (entities undecoded, CDATA sections kept with their
//!   `<![CDATA[...]]>` wrapper) so the text normalizer decides how to decode.
//!
//! Names are kept qualified exactly as written (`dc:creator`, `rdf:about`);
//! the [`FieldTags`] lists the namespaced and bare variants a field may use.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::util::{decode_entities, normalize_content, normalize_text, parse_timestamp, present};

/// SEC-003: Maximum element nesting depth; deeper input stops the reader.
const MAX_DEPTH: usize = 256;

/// A node in the tree: an element or a run of raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its qualified name, decoded attributes and children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

        let mut attrs = start.attributes();
        attrs.with_checks(false);
        let attributes = attrs
            .filter_map(|attr| match attr {
                Ok(attr) => {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let raw = String::from_utf8_lossy(&attr.value);
                    Some((key, decode_entities(&raw).into_owned()))
                }
                Err(e) => {
                    tracing::debug!(element = %name, error = %e, "Skipping malformed attribute");
                    None
                }
            })
            .collect();

        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    /// Value of the attribute with the given qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// Direct child elements with the given qualified name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.name == name)
    }

    /// First direct child element with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name == name)
    }

    /// First descendant (depth-first, document order) with the given name.
    pub fn find_first(&self, name: &str) -> Option<&XmlElement> {
        self.elements()
            .find_map(|el| if el.name == name { Some(el) } else { el.find_first(name) })
    }

    /// All descendants with the given name. The search does not descend into
    /// a match, so nested same-named elements are not reported twice.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        for el in self.elements() {
            if el.name == name {
                found.push(el);
            } else {
                el.collect_named(name, found);
            }
        }
    }

    /// True if any child is an element (mixed or structured content).
    pub fn has_element_children(&self) -> bool {
        self.elements().next().is_some()
    }

    /// The element's content as raw text.
    ///
    /// Leaf elements yield their raw text; elements with element children
    /// (XHTML content, unescaped HTML) are re-serialized so the markup
    /// survives for [`normalize_content`] or [`normalize_text`].
    pub fn value(&self) -> String {
        if self.has_element_children() {
            return self.inner_markup();
        }
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Serializes the children back to markup.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            write_node(&mut out, node);
        }
        out
    }
}

fn write_node(out: &mut String, node: &XmlNode) {
    match node {
        XmlNode::Text(text) => out.push_str(text),
        XmlNode::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (key, value) in &el.attributes {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                for c in value.chars() {
                    match c {
                        '&' => out.push_str("&amp;"),
                        '"' => out.push_str("&quot;"),
                        '<' => out.push_str("&lt;"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
            }
            if el.children.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for child in &el.children {
                    write_node(out, child);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

/// A parsed document: a synthetic container holding the top-level nodes.
#[derive(Debug, Clone, Default)]
pub struct XmlDocument {
    document: XmlElement,
}

impl XmlDocument {
    /// Builds a tree from raw XML text. Never fails; see the module docs for
    /// how malformed input is handled.
    pub fn parse(xml: &str) -> Self {
        let mut reader = Reader::from_str(xml);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.expand_empty_elements = false;

        // stack[0] is the synthetic document node and is never popped.
        let mut stack: Vec<XmlElement> = vec![XmlElement::default()];

        // SEC-002: DOCTYPE declarations are skipped, never interpreted, so
        // external or custom entities are never expanded.
        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    if stack.len() > MAX_DEPTH {
                        tracing::warn!(max_depth = MAX_DEPTH, "XML nesting too deep, truncating document");
                        break;
                    }
                    stack.push(XmlElement::from_start(&start));
                }
                Ok(Event::Empty(start)) => {
                    attach(&mut stack, XmlNode::Element(XmlElement::from_start(&start)));
                }
                Ok(Event::End(end)) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    close_element(&mut stack, &name);
                }
                Ok(Event::Text(text)) => {
                    let raw = String::from_utf8_lossy(&text).into_owned();
                    attach(&mut stack, XmlNode::Text(raw));
                }
                Ok(Event::CData(cdata)) => {
                    let inner = String::from_utf8_lossy(&cdata);
                    attach(&mut stack, XmlNode::Text(format!("<![CDATA[{inner}]]>")));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        position = reader.buffer_position(),
                        error = %e,
                        "XML syntax error, keeping partial document"
                    );
                    break;
                }
            }
        }

        while stack.len() > 1 {
            close_top(&mut stack);
        }
        let document = stack.pop().unwrap_or_default();
        Self { document }
    }

    /// The first top-level element, if the input contained any.
    pub fn root(&self) -> Option<&XmlElement> {
        self.document.elements().next()
    }

    /// The synthetic container; useful as a search scope when the expected
    /// root element is missing.
    pub fn as_element(&self) -> &XmlElement {
        &self.document
    }
}

fn attach(stack: &mut [XmlElement], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        // Merge adjacent text so a value split by the reader stays one run.
        if let (XmlNode::Text(text), Some(XmlNode::Text(prev))) = (&node, parent.children.last_mut()) {
            prev.push_str(text);
            return;
        }
        parent.children.push(node);
    }
}

fn close_top(stack: &mut Vec<XmlElement>) {
    if stack.len() > 1 {
        if let Some(el) = stack.pop() {
            attach(stack, XmlNode::Element(el));
        }
    }
}

/// Closes the innermost open element named `name`, implicitly closing any
/// elements opened after it. End tags with no open counterpart are ignored.
fn close_element(stack: &mut Vec<XmlElement>, name: &str) {
    let Some(position) = stack.iter().skip(1).rposition(|el| el.name == name) else {
        tracing::trace!(name = %name, "Ignoring unmatched end tag");
        return;
    };
    let target_len = position + 1; // skip(1) offset
    while stack.len() > target_len {
        close_top(stack);
    }
}

/// Logical fields every dialect resolves through its [`FieldTags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Link,
    Description,
    Content,
    Summary,
    Author,
    Published,
    Id,
}

/// Maps logical fields to ordered candidate tag names.
///
/// Candidates are tried in order and, within a candidate, repeated children
/// are tried in document order; the first one that yields a present value
/// wins. Each dialect declares its own table, the lookup logic is shared.
pub struct FieldTags {
    entries: &'static [(Field, &'static [&'static str])],
}

impl FieldTags {
    pub const fn new(entries: &'static [(Field, &'static [&'static str])]) -> Self {
        Self { entries }
    }

    /// Candidate tag names for a field, most preferred first.
    pub fn candidates(&self, field: Field) -> &'static [&'static str] {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, tags)| *tags)
            .unwrap_or(&[])
    }

    /// Resolves a field with a custom conversion; the first candidate child
    /// for which `convert` returns `Some` wins.
    pub fn resolve<T>(
        &self,
        element: &XmlElement,
        field: Field,
        mut convert: impl FnMut(&XmlElement) -> Option<T>,
    ) -> Option<T> {
        self.candidates(field)
            .iter()
            .flat_map(|tag| element.children_named(tag))
            .find_map(|child| convert(child))
    }

    /// Resolves a field to its raw, unnormalized value.
    pub fn raw(&self, element: &XmlElement, field: Field) -> Option<String> {
        self.resolve(element, field, |child| {
            let value = child.value();
            present(&value).is_some().then_some(value)
        })
    }

    /// Resolves a field as normalized plain text.
    pub fn text(&self, element: &XmlElement, field: Field) -> Option<String> {
        self.resolve(element, field, |child| normalize_text(&child.value()))
    }

    /// Resolves a field as markup-preserving content.
    pub fn content(&self, element: &XmlElement, field: Field) -> Option<String> {
        self.resolve(element, field, |child| normalize_content(&child.value()))
    }

    /// Resolves a field as a timestamp; candidates that do not parse are
    /// skipped rather than ending the search.
    pub fn timestamp(&self, element: &XmlElement, field: Field) -> Option<DateTime<Utc>> {
        self.resolve(element, field, |child| {
            normalize_text(&child.value()).and_then(|text| parse_timestamp(&text))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_tree() {
        let doc = XmlDocument::parse("<rss><channel><title>T</title></channel></rss>");
        let root = doc.root().unwrap();
        assert_eq!(root.name, "rss");
        let channel = root.child("channel").unwrap();
        assert_eq!(channel.child("title").unwrap().value(), "T");
    }

    #[test]
    fn test_text_kept_raw_and_cdata_wrapped() {
        let doc = XmlDocument::parse("<d>a &amp; b <![CDATA[<p>x</p>]]></d>");
        assert_eq!(
            doc.root().unwrap().value(),
            "a &amp; b <![CDATA[<p>x</p>]]>"
        );
    }

    #[test]
    fn test_unknown_entities_do_not_break_parsing() {
        let doc = XmlDocument::parse("<d>a&nbsp;b</d>");
        assert_eq!(doc.root().unwrap().value(), "a&nbsp;b");
    }

    #[test]
    fn test_attributes_decoded() {
        let doc = XmlDocument::parse(r#"<link href="http://x/?a=1&amp;b=2" rel="alternate"/>"#);
        let link = doc.root().unwrap();
        assert_eq!(link.attr("href"), Some("http://x/?a=1&b=2"));
        assert_eq!(link.attr("rel"), Some("alternate"));
        assert_eq!(link.attr("type"), None);
    }

    #[test]
    fn test_mismatched_end_tags_are_tolerated() {
        // Unescaped <br> inside a description never gets closed.
        let doc = XmlDocument::parse(
            "<item><description>one<br>two</description><link>http://x/1</link></item>",
        );
        let item = doc.root().unwrap();
        assert_eq!(item.child("link").unwrap().value(), "http://x/1");
        let description = item.child("description").unwrap();
        assert!(description.has_element_children());
    }

    #[test]
    fn test_stray_end_tag_ignored() {
        let doc = XmlDocument::parse("<a><b>x</b></c></a>");
        let a = doc.root().unwrap();
        assert_eq!(a.child("b").unwrap().value(), "x");
    }

    #[test]
    fn test_truncated_document_keeps_partial_tree() {
        let doc = XmlDocument::parse("<rss><channel><item><title>kept</title></item><item><tit");
        let channel = doc.root().unwrap().child("channel").unwrap();
        let items: Vec<_> = channel.children_named("item").collect();
        assert!(!items.is_empty());
        assert_eq!(items[0].child("title").unwrap().value(), "kept");
    }

    #[test]
    fn test_no_elements_means_no_root() {
        assert!(XmlDocument::parse("").root().is_none());
        assert!(XmlDocument::parse("just some text").root().is_none());
    }

    #[test]
    fn test_doctype_is_ignored() {
        let doc = XmlDocument::parse(
            r#"<?xml version="1.0"?><!DOCTYPE r [<!ENTITY x "boom">]><r>&x;</r>"#,
        );
        assert_eq!(doc.root().unwrap().value(), "&x;");
    }

    #[test]
    fn test_inner_markup_round_trips_structure() {
        let doc = XmlDocument::parse(
            r#"<content type="xhtml"><div><p class="a">Hi &amp; <b>there</b></p><br/></div></content>"#,
        );
        assert_eq!(
            doc.root().unwrap().value(),
            r#"<div><p class="a">Hi &amp; <b>there</b></p><br/></div>"#
        );
    }

    #[test]
    fn test_child_outlives_lookup_name() {
        let doc = XmlDocument::parse("<a><b>x</b></a>");
        let root = doc.root().unwrap();
        let found = {
            let name = String::from("b");
            root.child(&name)
        };
        assert_eq!(found.unwrap().value(), "x");
    }

    #[test]
    fn test_descendants_named_does_not_recurse_into_matches() {
        let doc = XmlDocument::parse("<r><x><item><item/></item></x><item/></r>");
        assert_eq!(doc.root().unwrap().descendants_named("item").len(), 2);
    }

    #[test]
    fn test_find_first_depth_first() {
        let doc = XmlDocument::parse("<r><a><channel>deep</channel></a><channel>shallow</channel></r>");
        assert_eq!(doc.root().unwrap().find_first("channel").unwrap().value(), "deep");
    }

    const TABLE: FieldTags = FieldTags::new(&[
        (Field::Content, &["content:encoded", "encoded", "description"]),
        (Field::Published, &["pubDate", "dc:date"]),
    ]);

    #[test]
    fn test_tag_table_preference_order() {
        let doc = XmlDocument::parse(
            "<item><description>desc</description><content:encoded>full</content:encoded></item>",
        );
        let item = doc.root().unwrap();
        assert_eq!(TABLE.content(item, Field::Content).as_deref(), Some("full"));
    }

    #[test]
    fn test_tag_table_skips_blank_candidates() {
        let doc = XmlDocument::parse(
            "<item><content:encoded>  </content:encoded><description>desc</description></item>",
        );
        let item = doc.root().unwrap();
        assert_eq!(TABLE.content(item, Field::Content).as_deref(), Some("desc"));
    }

    #[test]
    fn test_tag_table_timestamp_skips_unparseable() {
        let doc = XmlDocument::parse(
            "<item><pubDate>garbage</pubDate><dc:date>2024-01-01T00:00:00Z</dc:date></item>",
        );
        let item = doc.root().unwrap();
        let ts = TABLE.timestamp(item, Field::Published).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_tag_table_unknown_field_has_no_candidates() {
        assert!(TABLE.candidates(Field::Author).is_empty());
    }
}
