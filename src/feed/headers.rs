//! Raw response header blobs and the caching headers carried in them.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use super::date::parse_datetime;

/// Renders a status line and header map as a CRLF-delimited block
/// terminated by a blank line.
pub(crate) fn header_blob(status: StatusCode, headers: &HeaderMap) -> String {
    let mut blob = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in headers {
        blob.push_str(name.as_str());
        blob.push_str(": ");
        blob.push_str(&String::from_utf8_lossy(value.as_bytes()));
        blob.push_str("\r\n");
    }
    blob.push_str("\r\n");
    blob
}

/// Value of the first header named `name` (case-insensitive) in `blob`.
fn header_value<'a>(blob: &'a str, name: &str) -> Option<&'a str> {
    blob.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// The `ETag` value from a raw header blob, exactly as the server sent it.
pub fn etag_from_header(blob: &str) -> Option<String> {
    header_value(blob, "etag").map(str::to_string)
}

/// The `Last-Modified` instant from a raw header blob.
pub fn last_modified_from_header(blob: &str) -> Option<DateTime<Utc>> {
    header_value(blob, "last-modified").and_then(parse_datetime)
}

/// RFC 7231 IMF-fixdate, as sent in `If-Modified-Since`.
pub(crate) fn http_date(instant: DateTime<Utc>) -> String {
    instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `If-None-Match` wants an entity tag; some servers send bare tokens.
pub(crate) fn quoted_etag(etag: &str) -> String {
    let etag = etag.trim();
    if etag.starts_with('"') || etag.starts_with("W/") {
        etag.to_string()
    } else {
        format!("\"{etag}\"")
    }
}
