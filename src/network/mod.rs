//! Transport seam and the status-classifying adapter over a raw HTTP stack.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::cache::Headers;
use crate::request::{NetworkResponse, RequestCore, RequestError};

/// Attempts slower than this are logged.
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(3);

/// Performs one transport attempt for a request.
///
/// `extra_headers` (conditional validators) take precedence over the
/// request's own headers.
pub trait Network: Send + Sync {
    fn perform_request(
        &self,
        request: &RequestCore,
        extra_headers: &Headers,
    ) -> Result<NetworkResponse, RequestError>;
}

/// Raw HTTP exchange result, before status classification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Failures below the HTTP layer.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("malformed url: {0}")]
    MalformedUrl(String),
    #[error("i/o failure: {0}")]
    Io(String),
}

/// A raw HTTP client: sends the request with the given headers and waits at
/// most `timeout`.
pub trait HttpStack: Send + Sync {
    fn execute(
        &self,
        request: &RequestCore,
        headers: &Headers,
        timeout: Duration,
    ) -> Result<HttpResponse, StackError>;
}

/// [`Network`] over an [`HttpStack`]: merges headers, handles 304 against the
/// request's annotated cache entry and classifies status codes.
#[derive(Debug)]
pub struct BasicNetwork<S> {
    stack: S,
}

impl<S: HttpStack> BasicNetwork<S> {
    pub fn new(stack: S) -> Self {
        Self { stack }
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }
}

impl<S: HttpStack> Network for BasicNetwork<S> {
    fn perform_request(
        &self,
        request: &RequestCore,
        extra_headers: &Headers,
    ) -> Result<NetworkResponse, RequestError> {
        let started = Instant::now();
        let mut headers = request.headers().clone();
        merge_headers(&mut headers, extra_headers.clone());

        let http = self
            .stack
            .execute(request, &headers, request.timeout())
            .map_err(|err| match err {
                StackError::Timeout => RequestError::Timeout,
                StackError::Connect(msg) => RequestError::NoConnection(msg),
                StackError::MalformedUrl(url) => RequestError::MalformedTarget(url),
                StackError::Io(msg) => RequestError::Network(msg),
            })?;
        let elapsed = started.elapsed();
        if elapsed > SLOW_REQUEST_THRESHOLD {
            debug!(
                url = request.url(),
                status = http.status,
                elapsed_ms = elapsed.as_millis() as u64,
                retry_count = request.retry_count(),
                "slow http request"
            );
        }

        classify(request, http, elapsed)
    }
}

fn classify(
    request: &RequestCore,
    http: HttpResponse,
    elapsed: Duration,
) -> Result<NetworkResponse, RequestError> {
    let status = http.status;
    if status == 304 {
        return Ok(match request.cache_entry() {
            Some(entry) => {
                let mut merged = entry.response_headers;
                merge_headers(&mut merged, http.headers);
                NetworkResponse::new(304, entry.data, merged, true, elapsed)
            }
            None => NetworkResponse::new(304, Vec::new(), http.headers, true, elapsed),
        });
    }

    let response = NetworkResponse::new(status, http.body, http.headers, false, elapsed);
    match status {
        200..=299 => Ok(response),
        401 | 403 => Err(RequestError::AuthRequired { response: Some(response), resolution: None }),
        400..=499 => Err(RequestError::ClientRejected { response }),
        _ => Err(RequestError::ServerFailed { response: Some(response) }),
    }
}

/// Insert `incoming` into `base`, replacing names that match case-insensitively.
fn merge_headers(base: &mut Headers, incoming: Headers) {
    for (name, value) in incoming {
        base.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        base.insert(name, value);
    }
}
