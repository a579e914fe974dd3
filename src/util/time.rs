use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Naive layouts seen in the wild when feeds ignore both RFC 2822 and RFC 3339.
/// Interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a feed timestamp into UTC.
///
/// Tries, in order: RFC 3339 (Atom, `dc:date`), RFC 2822 (RSS `pubDate`),
/// a handful of offset-less layouts treated as UTC, and a bare `YYYY-MM-DD`
/// date at midnight UTC. Returns `None` if nothing matches, never an error:
/// a bad date only means the item is stored without one.
///
/// # Examples
///
/// ```
/// use feedmill::util::parse_timestamp;
///
/// let ts = parse_timestamp("Mon, 01 Jan 2024 00:00:00 GMT").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");
/// assert!(parse_timestamp("yesterday-ish").is_none());
/// ```
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // Some generators emit "UTC" where RFC 2822 expects "GMT" or "+0000".
    if let Some(head) = value.strip_suffix(" UTC") {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&format!("{head} +0000")) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
