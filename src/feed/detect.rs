use serde::Serialize;

const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// The syndication dialect a payload is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Atom,
    Rdf,
    Rss2,
}

/// Classifies a raw XML payload by cheap substring tests.
///
/// Atom is recognized by its default namespace declaration or a `<feed`
/// element start; RDF by an `<rdf:RDF` or bare `<RDF` element start.
/// Everything else, including non-XML input, is treated as RSS 2.0, whose
/// parser is the most forgiving. Never fails.
///
/// # Examples
///
/// ```
/// use feedmill::feed::{detect_format, FeedFormat};
///
/// assert_eq!(detect_format(r#"<feed xmlns="http://www.w3.org/2005/Atom">"#), FeedFormat::Atom);
/// assert_eq!(detect_format("<rdf:RDF><item/></rdf:RDF>"), FeedFormat::Rdf);
/// assert_eq!(detect_format("<rss><channel/></rss>"), FeedFormat::Rss2);
/// ```
pub fn detect_format(xml: &str) -> FeedFormat {
    if declares_atom_namespace(xml) || has_element_start(xml, "feed") {
        FeedFormat::Atom
    } else if has_element_start(xml, "rdf:RDF") || has_element_start(xml, "RDF") {
        FeedFormat::Rdf
    } else {
        FeedFormat::Rss2
    }
}

/// True for `xmlns="…Atom"` (either quote style). A prefixed declaration
/// such as `xmlns:atom=` inside an RSS feed does not count.
fn declares_atom_namespace(xml: &str) -> bool {
    xml.contains(&format!("xmlns=\"{ATOM_NAMESPACE}\""))
        || xml.contains(&format!("xmlns='{ATOM_NAMESPACE}'"))
}

/// True if `<name` appears followed by whitespace, `>` or `/`, so `<feed`
/// does not match `<feedburner:info>`.
fn has_element_start(xml: &str, name: &str) -> bool {
    let needle = format!("<{name}");
    xml.match_indices(&needle).any(|(idx, _)| {
        xml[idx + needle.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
    })
}
