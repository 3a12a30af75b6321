//! Metric recorders for the request pipeline.
//!
//! Thin wrappers over the `metrics` facade so metric names and labels live in
//! one place. Without an installed recorder every call is a no-op.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

pub const CACHE_TRIAGE_TOTAL: &str = "courier_cache_triage_total";
pub const RETRIES_TOTAL: &str = "courier_retries_total";
pub const DELIVERIES_TOTAL: &str = "courier_deliveries_total";
pub const CACHE_EVICTIONS_TOTAL: &str = "courier_cache_evictions_total";
pub const CACHE_BYTES: &str = "courier_cache_bytes";
pub const NETWORK_LATENCY_MS: &str = "courier_network_latency_ms";
pub const REQUESTS_FINISHED_TOTAL: &str = "courier_requests_finished_total";

/// Register descriptions with the installed recorder.
pub fn init_metrics() {
    describe_counter!(CACHE_TRIAGE_TOTAL, "Cache dispatcher lookups by outcome");
    describe_counter!(RETRIES_TOTAL, "Transport retries by error kind");
    describe_counter!(DELIVERIES_TOTAL, "Responses handed to the delivery executor");
    describe_counter!(CACHE_EVICTIONS_TOTAL, "Records evicted from the disk cache");
    describe_gauge!(CACHE_BYTES, Unit::Bytes, "Body bytes held by the disk cache");
    describe_histogram!(NETWORK_LATENCY_MS, Unit::Milliseconds, "Transport round-trip time");
    describe_counter!(REQUESTS_FINISHED_TOTAL, "Requests finished by reason");
}

/// `outcome` is one of `miss`, `expired`, `hit`, `soft_stale`, `unparseable`.
pub fn record_cache_triage(outcome: &'static str) {
    counter!(CACHE_TRIAGE_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_retry(kind: &'static str) {
    counter!(RETRIES_TOTAL, "kind" => kind).increment(1);
}

/// `kind` is one of `success`, `error`, `intermediate`.
pub fn record_delivery(kind: &'static str) {
    counter!(DELIVERIES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_eviction() {
    counter!(CACHE_EVICTIONS_TOTAL).increment(1);
}

pub fn record_cache_size(bytes: u64) {
    gauge!(CACHE_BYTES).set(bytes as f64);
}

pub fn record_network_latency(elapsed: Duration) {
    histogram!(NETWORK_LATENCY_MS).record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_finished(reason: &'static str) {
    counter!(REQUESTS_FINISHED_TOTAL, "reason" => reason).increment(1);
}
