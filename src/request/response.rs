//! Raw network responses and parsed, deliverable responses.

use std::time::Duration;

use crate::cache::{CacheEntry, Headers};

use super::error::RequestError;

/// Raw result of a single transport attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub status: u16,
    pub data: Vec<u8>,
    pub headers: Headers,
    /// True only for a conditional-revalidation hit (HTTP 304).
    pub not_modified: bool,
    /// Round-trip time of the transport call.
    pub network_time: Duration,
}

impl NetworkResponse {
    pub fn new(
        status: u16,
        data: Vec<u8>,
        headers: Headers,
        not_modified: bool,
        network_time: Duration,
    ) -> Self {
        Self { status, data, headers, not_modified, network_time }
    }

    /// A 200 response with the given body and no headers.
    pub fn ok(data: impl Into<Vec<u8>>) -> Self {
        Self::new(200, data.into(), Headers::new(), false, Duration::ZERO)
    }

    /// Wrap a cached entry so handlers can parse it like a fresh response.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        Self::new(200, entry.data.clone(), entry.response_headers.clone(), false, Duration::ZERO)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Outcome of parsing a [`NetworkResponse`]: a typed result plus the cache
/// entry derived from it, or an error. Never both.
#[derive(Debug)]
pub struct Response<T> {
    pub result: Result<T, RequestError>,
    /// Cache metadata for a successful response, `None` for errors.
    pub cache_entry: Option<CacheEntry>,
    /// True when this is a soft-stale cache hit and a final delivery follows.
    pub intermediate: bool,
}

impl<T> Response<T> {
    pub fn success(result: T, cache_entry: Option<CacheEntry>) -> Self {
        Self { result: Ok(result), cache_entry, intermediate: false }
    }

    pub fn error(error: RequestError) -> Self {
        Self { result: Err(error), cache_entry: None, intermediate: false }
    }
}
