//! Utility functions shared by the dialect parsers and the ingestion pipeline.
//!
//! - **Text normalization**: CDATA unwrapping, tag stripping, entity decoding,
//!   whitespace collapsing and snippet construction
//! - **HTML sanitization**: allowlist cleaning of untrusted markup
//! - **Timestamps**: lenient feed date parsing into UTC
//! - **URL validation**: input checks performed before any fetch
//!
//! # Examples
//!
//! ```
//! use feedmill::util::{build_snippet, normalize_text, validate_feed_url};
//!
//! let url = validate_feed_url("https://example.com/feed.xml", false).unwrap();
//! assert_eq!(url.scheme(), "https");
//!
//! assert_eq!(normalize_text("<p>Hello&#33;</p>").as_deref(), Some("Hello!"));
//! assert_eq!(build_snippet(Some("<b>body</b>"), None).as_deref(), Some("body"));
//! ```

mod sanitize;
mod text;
mod time;
mod url_validator;

pub use sanitize::{sanitize_html, sanitize_page_body};
pub use text::{
    build_snippet, collapse_whitespace, decode_entities, normalize_content, normalize_text,
    present, strip_cdata, strip_control_chars, strip_tags, truncate_chars, SNIPPET_MAX_CHARS,
};
pub use time::parse_timestamp;
pub use url_validator::{validate_feed_url, UrlValidationError};
