//! Span utilities and extension traits for request tracing.

use std::time::Duration;

use tracing::{info_span, Span};

use crate::request::{NetworkResponse, RequestError};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    fn record_latency(&self, elapsed: Duration);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        self.record("latency_ms", elapsed.as_millis() as u64);
    }
}

/// Factory for transport attempt spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Create a `network_request` span.
    ///
    /// `status`, `http_status`, `error.message` and `latency_ms` start empty
    /// and are filled in by [`RequestSpan::record_attempt`].
    pub fn new(sequence: u64, url: &str) -> Span {
        info_span!(
            "network_request",
            sequence,
            url = %url,
            status = tracing::field::Empty,
            http_status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }

    /// Record the outcome of one transport attempt.
    pub fn record_attempt(
        span: &Span,
        result: &Result<NetworkResponse, RequestError>,
        elapsed: Duration,
    ) {
        span.record_result(result);
        span.record_latency(elapsed);
        let status = match result {
            Ok(response) => Some(response.status),
            Err(error) => error.response().map(|r| r.status),
        };
        if let Some(status) = status {
            span.record("http_status", status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_subscriber_is_harmless() {
        let span = RequestSpan::new(7, "https://example.com/");
        let ok: Result<NetworkResponse, RequestError> = Ok(NetworkResponse::ok("x"));
        RequestSpan::record_attempt(&span, &ok, Duration::from_millis(3));
        let err: Result<NetworkResponse, RequestError> = Err(RequestError::Timeout);
        RequestSpan::record_attempt(&span, &err, Duration::from_millis(3));
    }
}
