//! Allowlist HTML sanitizer for third-party markup stored as item content.
//!
//! Feed descriptions (RDF ones in particular) and fetched article bodies are
//! frequently raw HTML copied from the publisher's site. Before that markup is
//! persisted it is reduced to a small set of inline and structural tags by an
//! `ammonia` cleaner; everything executable is removed.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use ammonia::Builder;

use super::text::present;

/// Tags kept in the output. Attributes are filtered per tag.
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "article", "b", "blockquote", "br", "caption", "cite", "code", "dd", "del", "details",
    "div", "dl", "dt", "em", "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "i", "img", "ins", "kbd", "li", "main", "mark", "ol", "p", "pre", "q", "s", "section", "small", "span",
    "strong", "sub", "summary", "sup", "table", "tbody", "td", "tfoot", "th", "thead", "time",
    "tr", "u", "ul",
];

/// Tags dropped together with their content.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "frame", "frameset",
    "applet", "svg", "math", "title",
];

/// Page chrome dropped, with its content, when a whole page body is kept.
const PAGE_CHROME: &[&str] = &["header", "footer", "nav", "aside", "form"];

const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href"]),
    ("img", &["src", "alt", "width", "height"]),
    ("blockquote", &["cite"]),
    ("q", &["cite"]),
    ("del", &["cite"]),
    ("ins", &["cite"]),
    ("td", &["colspan", "rowspan"]),
    ("th", &["colspan", "rowspan"]),
    ("ol", &["start"]),
    ("time", &["datetime"]),
];

/// URL schemes permitted in `href`/`src`/`cite`; `javascript:`, `vbscript:`
/// and `data:` are therefore dropped.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

static SANITIZER: OnceLock<Builder<'static>> = OnceLock::new();
static PAGE_SANITIZER: OnceLock<Builder<'static>> = OnceLock::new();

fn build(drop_with_content: impl Iterator<Item = &'static str>) -> Builder<'static> {
    let tag_attributes: HashMap<&str, HashSet<&str>> = TAG_ATTRIBUTES
        .iter()
        .map(|(tag, attrs)| (*tag, attrs.iter().copied().collect()))
        .collect();

    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .clean_content_tags(drop_with_content.collect())
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::from(["title"]))
        .url_schemes(ALLOWED_SCHEMES.iter().copied().collect())
        .link_rel(None)
        .strip_comments(true);
    builder
}

fn clean_with(builder: &Builder<'_>, input: &str) -> Option<String> {
    present(input)?;
    let cleaned = builder.clean(input).to_string();
    present(&cleaned).map(str::to_owned)
}

/// Sanitizes untrusted HTML, returning `None` if nothing meaningful remains.
///
/// - Keeps common inline/structural tags (`p`, `a`, `em`, `ul`, `table`, ...).
/// - Drops `script`, `style`, `iframe`, `object`, `embed` and similar
///   elements including their content.
/// - Unknown tags are removed but their text content is kept.
/// - Only a per-tag attribute allowlist survives: event handlers (`on*`),
///   `style`, `class` and `id` are always stripped, and `href`/`src` values
///   using `javascript:`, `vbscript:` or `data:` are dropped.
/// - Comments and doctypes are removed.
///
/// # Examples
///
/// ```
/// use feedmill::util::sanitize_html;
///
/// let clean = sanitize_html(r#"<p onclick="steal()">Hi<script>x()</script></p>"#);
/// assert_eq!(clean.as_deref(), Some("<p>Hi</p>"));
/// ```
pub fn sanitize_html(input: &str) -> Option<String> {
    let builder = SANITIZER.get_or_init(|| build(DROP_WITH_CONTENT.iter().copied()));
    clean_with(builder, input)
}

/// [`sanitize_html`] for a whole page body: additionally drops `header`,
/// `footer`, `nav`, `aside` and `form` together with their content.
pub fn sanitize_page_body(input: &str) -> Option<String> {
    let builder = PAGE_SANITIZER.get_or_init(|| {
        build(DROP_WITH_CONTENT.iter().chain(PAGE_CHROME).copied())
    });
    clean_with(builder, input)
}
