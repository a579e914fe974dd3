use std::borrow::Cow;

/// Maximum length of a content snippet, in characters (not bytes).
pub const SNIPPET_MAX_CHARS: usize = 200;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Unwraps every CDATA section, keeping the payloads and the text between
/// them.
///
/// A section ends at the first `]]>`, so the split-section form used to
/// carry a literal `]]>` (`<![CDATA[a ]]]]><![CDATA[> b]]>`) yields
/// `a ]]> b`. An unterminated section keeps the rest of the value as its
/// payload.
///
/// # Examples
///
/// ```
/// use feedmill::util::strip_cdata;
///
/// assert_eq!(strip_cdata("<![CDATA[<b>hi</b>]]>"), "<b>hi</b>");
/// assert_eq!(strip_cdata("Intro <![CDATA[<b>bold</b>]]>"), "Intro <b>bold</b>");
/// assert_eq!(strip_cdata("plain"), "plain");
/// ```
pub fn strip_cdata(s: &str) -> Cow<'_, str> {
    if !s.contains(CDATA_OPEN) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find(CDATA_OPEN) {
        out.push_str(&rest[..open]);
        let payload = &rest[open + CDATA_OPEN.len()..];
        match payload.find(CDATA_CLOSE) {
            Some(close) => {
                out.push_str(&payload[..close]);
                rest = &payload[close + CDATA_CLOSE.len()..];
            }
            None => {
                out.push_str(payload);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}

/// Replaces every `<...>` markup run with a single space.
///
/// A `<` only opens a tag when followed by a letter, `/`, `!` or `?`, so
/// literal comparisons such as `a < b` survive. An unterminated tag at the
/// end of the input is kept as text.
pub fn strip_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let opens_tag = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));

        if !opens_tag {
            out.push_str(&rest[..=open]);
            rest = after;
            continue;
        }

        match after.find('>') {
            Some(close) => {
                out.push_str(&rest[..open]);
                out.push(' ');
                rest = &after[close + 1..];
            }
            None => break,
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}

/// Decodes numeric character references and the five predefined XML entities.
///
/// Decimal (`&#38;`) and hexadecimal (`&#x26;`) references are resolved when
/// they name a valid Unicode scalar value. Named entities other than `amp`,
/// `lt`, `gt`, `quot` and `apos` are left verbatim; no DTD is ever consulted.
/// Decoding is a single pass, so `&amp;lt;` becomes `&lt;`.
///
/// # Examples
///
/// ```
/// use feedmill::util::decode_entities;
///
/// assert_eq!(decode_entities("A &amp; B &#169; &#x263A;"), "A & B © ☺");
/// assert_eq!(decode_entities("&nbsp;"), "&nbsp;");
/// ```
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];

        // Entity names are short; bound the search so a stray '&' in a long
        // paragraph doesn't pair with a far-away ';'.
        let decoded = candidate
            .char_indices()
            .take(12)
            .find(|&(_, c)| c == ';')
            .and_then(|(semi, _)| resolve_entity(&candidate[..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Removes ASCII control characters except tab, newline and carriage return.
///
/// Returns `Cow::Borrowed` when the input is already clean (the common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_control(c)).collect())
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns `Some(trimmed)` if the value is non-empty after trimming.
///
/// Every preference chain in the dialect parsers uses this to decide whether
/// a candidate field counts as present.
pub fn present(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Normalizes a field value into plain text.
///
/// Applies `strip_cdata`, then `strip_tags`, then `decode_entities` (last, so
/// entities hidden inside removed tags never leak), removes control
/// characters and collapses whitespace. An empty result is `None`.
///
/// # Examples
///
/// ```
/// use feedmill::util::normalize_text;
///
/// assert_eq!(
///     normalize_text("<![CDATA[<p>A &amp; B</p>]]>").as_deref(),
///     Some("A & B")
/// );
/// assert_eq!(normalize_text("  <br/>  "), None);
/// ```
pub fn normalize_text(raw: &str) -> Option<String> {
    let unwrapped = strip_cdata(raw);
    let stripped = strip_tags(&unwrapped);
    let decoded = decode_entities(&stripped);
    let cleaned = strip_control_chars(&decoded);
    let collapsed = collapse_whitespace(&cleaned);
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Normalizes a value that is meant to keep its markup.
///
/// Only unwraps CDATA and decodes entities; tags are preserved.
pub fn normalize_content(raw: &str) -> Option<String> {
    let unwrapped = strip_cdata(raw);
    let decoded = decode_entities(&unwrapped);
    present(&decoded).map(str::to_owned)
}

/// Truncates to at most `max_chars` characters, always on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Builds the snippet stored alongside a content item.
///
/// An explicit summary wins when present; otherwise the snippet is derived
/// from the content. Either way the text is normalized (tags stripped,
/// entities decoded) and cut to [`SNIPPET_MAX_CHARS`] characters with no
/// word-boundary adjustment.
pub fn build_snippet(content: Option<&str>, explicit_summary: Option<&str>) -> Option<String> {
    let source = explicit_summary
        .and_then(present)
        .or_else(|| content.and_then(present))?;
    let text = normalize_text(source)?;
    let snippet = truncate_chars(&text, SNIPPET_MAX_CHARS).trim_end();
    (!snippet.is_empty()).then(|| snippet.to_owned())
}
