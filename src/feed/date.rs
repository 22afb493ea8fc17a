//! Timestamp normalization for feed dates.
//!
//! Feeds carry dates in RFC 822/2822, RFC 3339, W3C-DTF, or something a
//! publisher made up. [`parse_datetime`] tries the strict formats first and,
//! when every one of them rejects the input, falls back to pulling the
//! day/year/time/zone out with a permissive pattern and guessing the month.
//! A string that survives neither path yields `None`; the caller keeps going
//! without a date.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::util::collapse_whitespace;

/// Matches strings like `"’ªÓ, 1 ???Ľ„â 2009 14:26 -0400"`: a garbled weekday,
/// the day of month, a garbled month, the year, the time, and a zone.
static FALLBACK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r".+?\s+(\d?\d)\s+.+?(\d\d\d\d)\s+(\d?\d):(\d\d):?(\d?\d)?\s+([-+]\d\d\d\d|\w\w\w)")
        .expect("Invalid date fallback pattern")
});

/// Offset-carrying formats tried after RFC 3339 and RFC 2822.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
];

/// Formats without a zone; these are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parses a feed timestamp into a UTC instant.
///
/// Returns `None` when the string is unparseable even by the fallback
/// heuristic. That is an expected outcome for junk input, not an error.
pub fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    parse_datetime_at(input, Utc::now())
}

/// Same as [`parse_datetime`] with an explicit notion of "today", which the
/// fallback path uses for year clamping and month inference.
pub fn parse_datetime_at(input: &str, today: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cleaned = collapse_whitespace(input);
    if cleaned.is_empty() {
        return None;
    }

    if let Some(parsed) = parse_strict(&cleaned) {
        return Some(parsed);
    }

    match parse_fallback(&cleaned, today) {
        Some(parsed) => {
            tracing::debug!(
                input = %input,
                normalized = %parsed.to_rfc3339(),
                "Recovered malformed date via fallback extraction"
            );
            Some(parsed)
        }
        None => {
            tracing::debug!(input = %input, "Date could not be parsed");
            None
        }
    }
}

fn parse_strict(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Heuristic recovery for dates with garbled month/weekday tokens.
///
/// Years beyond the current one are clamped to it. The month is guessed from
/// the day of month alone: a day that has already passed this month is taken
/// to mean next month, anything else this month. Near month boundaries the
/// guess can be wrong; inputs reaching this path are already corrupt.
fn parse_fallback(s: &str, today: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = FALLBACK_PATTERN.captures(s)?;

    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let mut year: i32 = caps.get(2)?.as_str().parse().ok()?;
    let hour: u32 = caps.get(3)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(4)?.as_str().parse().ok()?;
    let second: u32 = caps
        .get(5)
        .map(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map_or(Ok(0), |m| m.parse::<u32>())
        .ok()?;
    let zone = caps.get(6)?.as_str();

    if year > today.year() {
        year = today.year();
    }

    let month = if day < today.day() {
        today.month() % 12 + 1
    } else {
        today.month()
    };

    let offset = zone_offset(zone);
    let canonical = format!(
        "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02} {}",
        format_offset(offset)
    );

    DateTime::parse_from_str(&canonical, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolves a numeric offset (`-0500`) or a zone abbreviation (`EST`).
/// Unknown abbreviations are treated as UTC.
fn zone_offset(zone: &str) -> FixedOffset {
    let utc = Utc.fix();

    if let Some(sign) = zone.chars().next().filter(|c| *c == '+' || *c == '-') {
        let digits = &zone[1..];
        let hours: i32 = digits.get(0..2).and_then(|h| h.parse().ok()).unwrap_or(0);
        let minutes: i32 = digits.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
        let mut seconds = hours * 3600 + minutes * 60;
        if sign == '-' {
            seconds = -seconds;
        }
        return FixedOffset::east_opt(seconds).unwrap_or(utc);
    }

    let hours_east: f32 = match zone.to_ascii_uppercase().as_str() {
        "UTC" | "GMT" | "WET" => 0.0,
        "EST" => -5.0,
        "EDT" => -4.0,
        "CST" => -6.0,
        "CDT" => -5.0,
        "MST" => -7.0,
        "MDT" => -6.0,
        "PST" => -8.0,
        "PDT" => -7.0,
        "HST" => -10.0,
        "BST" | "CET" => 1.0,
        "EET" => 2.0,
        "MSK" => 3.0,
        "IST" => 5.5,
        "JST" => 9.0,
        _ => {
            tracing::debug!(zone = %zone, "Unknown timezone abbreviation, assuming UTC");
            0.0
        }
    };

    FixedOffset::east_opt((hours_east * 3600.0) as i32).unwrap_or(utc)
}

fn format_offset(offset: FixedOffset) -> String {
    let total = offset.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let abs = total.abs();
    format!("{sign}{:02}{:02}", abs / 3600, (abs % 3600) / 60)
}

/// The earliest of a set of candidate instants.
///
/// Several source elements (`pubDate`, `dc:date`, `issued`, ...) can feed the
/// same logical "published" field; the oldest one wins.
pub fn earliest<I>(values: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    values.into_iter().min()
}

/// The latest of a set of candidate instants, used for "updated".
pub fn latest<I>(values: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    values.into_iter().max()
}
