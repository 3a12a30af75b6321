//! HTTP caching header parsing and conditional request headers.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::request::NetworkResponse;

use super::{now_millis, CacheEntry, Headers};

/// Charset assumed when `Content-Type` names none.
pub const DEFAULT_CHARSET: &str = "ISO-8859-1";

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Parse an RFC 1123 date into epoch milliseconds, `0` if unparseable.
pub fn parse_date_as_epoch(value: &str) -> i64 {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return date.timestamp_millis();
    }
    NaiveDateTime::parse_from_str(value, HTTP_DATE_FORMAT)
        .map(|naive| naive.and_utc().timestamp_millis())
        .unwrap_or(0)
}

/// Format epoch milliseconds as an RFC 1123 date in GMT.
pub fn format_http_date(epoch_millis: i64) -> String {
    Utc.timestamp_millis_opt(epoch_millis)
        .single()
        .unwrap_or_default()
        .format(HTTP_DATE_FORMAT)
        .to_string()
}

/// Charset named by `Content-Type`, or `default`.
pub fn parse_charset(headers: &Headers, default: &str) -> String {
    header_value(headers, "Content-Type")
        .and_then(|content_type| {
            content_type.split(';').skip(1).find_map(|param| {
                let (name, value) = param.trim().split_once('=')?;
                name.trim()
                    .eq_ignore_ascii_case("charset")
                    .then(|| value.trim().trim_matches('"').to_string())
            })
        })
        .unwrap_or_else(|| default.to_string())
}

/// Derive a cache entry from a response's caching headers.
///
/// Returns `None` when the server forbids storing the response. Responses
/// with no freshness information still yield an (already expired) entry so
/// their validators can be used for revalidation.
pub fn parse_cache_headers(response: &NetworkResponse) -> Option<CacheEntry> {
    parse_cache_headers_at(response, now_millis())
}

pub fn parse_cache_headers_at(response: &NetworkResponse, now: i64) -> Option<CacheEntry> {
    let headers = &response.headers;

    let server_date = header_value(headers, "Date").map(parse_date_as_epoch).unwrap_or(0);

    let mut has_cache_control = false;
    let mut must_revalidate = false;
    let mut max_age: i64 = 0;
    let mut stale_while_revalidate: i64 = 0;
    if let Some(cache_control) = header_value(headers, "Cache-Control") {
        has_cache_control = true;
        for token in cache_control.split(',').map(str::trim) {
            let lower = token.to_ascii_lowercase();
            if lower == "no-cache" || lower == "no-store" {
                return None;
            } else if let Some(secs) = lower.strip_prefix("max-age=") {
                max_age = secs.trim().parse().unwrap_or(0);
            } else if let Some(secs) = lower.strip_prefix("stale-while-revalidate=") {
                stale_while_revalidate = secs.trim().parse().unwrap_or(0);
            } else if lower == "must-revalidate" || lower == "proxy-revalidate" {
                must_revalidate = true;
            }
        }
    }

    let server_expires = header_value(headers, "Expires").map(parse_date_as_epoch).unwrap_or(0);
    let last_modified =
        header_value(headers, "Last-Modified").map(parse_date_as_epoch).unwrap_or(0);
    let etag = header_value(headers, "ETag").map(str::to_string);

    let (soft_ttl, ttl) = if has_cache_control {
        let soft = now.saturating_add(max_age.saturating_mul(1000));
        let hard = if must_revalidate {
            soft
        } else {
            soft.saturating_add(stale_while_revalidate.saturating_mul(1000))
        };
        (soft, hard)
    } else if server_date > 0 && server_expires >= server_date {
        let soft = now + (server_expires - server_date);
        (soft, soft)
    } else {
        (0, 0)
    };

    Some(CacheEntry {
        data: response.data.clone(),
        etag,
        server_date,
        last_modified,
        ttl,
        soft_ttl,
        response_headers: headers.clone(),
    })
}

/// Conditional request headers for revalidating `entry`.
pub fn conditional_headers(entry: Option<&CacheEntry>) -> Headers {
    let mut headers = Headers::new();
    let Some(entry) = entry else {
        return headers;
    };
    if let Some(etag) = &entry.etag {
        headers.insert("If-None-Match".to_string(), etag.clone());
    }
    if entry.last_modified > 0 {
        headers.insert("If-Modified-Since".to_string(), format_http_date(entry.last_modified));
    }
    headers
}
