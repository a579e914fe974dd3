//! Full-article retrieval for a single content item.
//!
//! Feeds often carry only a teaser. [`fetch_full_content`] downloads the
//! item's page, keeps the main content region and replaces the stored body
//! with its sanitized markup.

use thiserror::Error;

use super::fetcher::{fetch_document, FetchError, FetchOptions, HTML_ACCEPT};
use crate::storage::{ContentItem, Database, DatabaseError};
use crate::util::{sanitize_html, sanitize_page_body, validate_feed_url, UrlValidationError};

/// Class-name fragments marking a `div` as the content container.
const DIV_CLASS_HINTS: &[&str] = &["article", "post", "entry", "content", "main"];

/// Class-name fragments marking a `section` as the content container.
const SECTION_CLASS_HINTS: &[&str] = &["article", "post", "entry", "content"];

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("Content {content_id} not found in feed {feed_id}")]
    NotFound { feed_id: i64, content_id: i64 },
    #[error(transparent)]
    Validation(#[from] UrlValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Page has no extractable content")]
    NoContent,
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Fetches the page behind one content item and stores its main content as
/// the item's body.
///
/// The item's URL goes through the same validation as a feed URL, so
/// private hosts stay off-limits unless `opts.allow_private_hosts` is set.
/// Only `content` changes; the snippet and the rest of the item are kept.
///
/// # Errors
///
/// - [`ArticleError::NotFound`] - the feed has no item with that id
/// - [`ArticleError::Validation`] - the item URL is not a fetchable http(s) URL
/// - [`ArticleError::Fetch`] - network failure, non-2xx status or timeout
/// - [`ArticleError::NoContent`] - nothing survived extraction
pub async fn fetch_full_content(
    db: &Database,
    client: &reqwest::Client,
    opts: &FetchOptions,
    feed_id: i64,
    content_id: i64,
) -> Result<ContentItem, ArticleError> {
    let not_found = || ArticleError::NotFound { feed_id, content_id };

    let item = db
        .get_content_item(feed_id, content_id)
        .await?
        .ok_or_else(not_found)?;
    let url = validate_feed_url(&item.content_url, opts.allow_private_hosts)?;

    let page = fetch_document(client, url.as_str(), opts, HTML_ACCEPT).await?;
    let content = extract_main_content(&page.body).ok_or(ArticleError::NoContent)?;

    let updated = db
        .set_content_body(feed_id, content_id, &content)
        .await?
        .ok_or_else(not_found)?;
    tracing::info!(
        feed_id,
        content_id,
        url = %item.content_url,
        bytes = content.len(),
        "Stored full article content"
    );
    Ok(updated)
}

/// Extracts and sanitizes the main content of an HTML page.
///
/// Looks for the first `<article>`, then `<main>`, then a `div` or `section`
/// whose class names suggest post content. Failing all of those, the page
/// body is kept minus its header, footer, navigation and sidebars.
///
/// # Examples
///
/// ```
/// use feedmill::feed::extract_main_content;
///
/// let page = "<body><nav>Menu</nav><article><p>Story</p></article></body>";
/// assert_eq!(extract_main_content(page).as_deref(), Some("<article><p>Story</p></article>"));
/// ```
pub fn extract_main_content(html: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets, so positions found in `lower`
    // slice `html` directly.
    let lower = html.to_ascii_lowercase();

    let region = find_element(html, &lower, "article", &[])
        .or_else(|| find_element(html, &lower, "main", &[]))
        .or_else(|| find_element(html, &lower, "div", DIV_CLASS_HINTS))
        .or_else(|| find_element(html, &lower, "section", SECTION_CLASS_HINTS));

    match region {
        Some(region) => sanitize_html(region),
        None => sanitize_page_body(find_element(html, &lower, "body", &[]).unwrap_or(html)),
    }
}

/// The first `<tag>` element, from its open tag through the matching close
/// tag, whose class attribute contains one of `class_hints` (any element when
/// `class_hints` is empty). An unclosed element runs to the end of input.
fn find_element<'a>(html: &'a str, lower: &str, tag: &str, class_hints: &[&str]) -> Option<&'a str> {
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut from = 0;

    while let Some(found) = lower[from..].find(&open) {
        let start = from + found;
        let name_end = start + open.len();
        if !is_name_boundary(lower, name_end) {
            from = name_end;
            continue;
        }
        let tag_end = name_end + lower[name_end..].find('>')?;
        from = tag_end + 1;

        if !class_hints.is_empty() && !class_matches(&lower[name_end..tag_end], class_hints) {
            continue;
        }
        let end = matching_close(lower, from, &open, &close).unwrap_or(html.len());
        return Some(&html[start..end]);
    }
    None
}

fn is_name_boundary(lower: &str, at: usize) -> bool {
    lower[at..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_whitespace() || c == '>' || c == '/')
}

/// Byte offset just past the close tag balancing an element opened before
/// `pos`, counting nested elements of the same name.
fn matching_close(lower: &str, mut pos: usize, open: &str, close: &str) -> Option<usize> {
    let mut depth = 1usize;
    loop {
        let next_close = pos + lower[pos..].find(close)?;
        match lower[pos..next_close].find(open) {
            Some(found) => {
                let after = pos + found + open.len();
                if is_name_boundary(lower, after) {
                    depth += 1;
                }
                pos = after;
            }
            None => {
                let after = next_close + close.len();
                pos = after + lower[after..].find('>').map_or(0, |i| i + 1);
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
        }
    }
}

fn class_matches(attrs: &str, hints: &[&str]) -> bool {
    class_value(attrs).is_some_and(|value| hints.iter().any(|hint| value.contains(hint)))
}

fn class_value(attrs: &str) -> Option<&str> {
    let mut rest = attrs;
    while let Some(idx) = rest.find("class") {
        let starts_attr = rest[..idx].ends_with(|c: char| c.is_ascii_whitespace());
        rest = &rest[idx + "class".len()..];
        if !starts_attr {
            continue;
        }
        let Some(value) = rest.trim_start().strip_prefix('=') else {
            continue;
        };
        let value = value.trim_start();
        return match value.chars().next()? {
            quote @ ('"' | '\'') => value[1..].find(quote).map(|end| &value[1..=end]),
            _ => value.split(|c: char| c.is_ascii_whitespace()).next(),
        };
    }
    None
}
