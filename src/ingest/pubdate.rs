//! Publish-date heuristics for scraped and feed-sourced posts.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

/// Formats for labels that carry a year, and for month-day labels once one is appended.
const LISTING_FORMATS: &[&str] = &["%b %d, %Y", "%B %d, %Y", "%b %d %Y", "%B %d %Y"];

fn parse_with_formats(text: &str) -> Option<NaiveDate> {
    LISTING_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Parse a listing date label such as `"Mar 29"` or `"Mar 29, 2023"`.
///
/// A label without a year gets `now`'s year, or the previous one when that
/// would put the post in the future ("Dec 30" seen in early January).
/// Labels that do not parse (e.g. "2 days ago") yield `None`.
#[must_use]
pub fn parse_listing_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let date = parse_with_formats(text).or_else(|| {
        let this_year = parse_with_formats(&format!("{text} {}", now.year()))?;
        if this_year <= now.date_naive() {
            Some(this_year)
        } else {
            parse_with_formats(&format!("{text} {}", now.year() - 1))
        }
    })?;

    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

/// Parse an RSS `<pubDate>`, accepting RFC 2822 and RFC 3339.
#[must_use]
pub fn parse_feed_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render a timestamp the way it is stored: RFC 3339, UTC, second precision.
#[must_use]
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
