//! Tests for cache triage, revalidation and delivery through a running queue.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use courier_core::cache::{Cache, DiskCache, Headers};
use courier_core::request::{NetworkResponse, Request};
use courier_core::scheduler::FinishReason;

use support::*;

fn disk_cache(dir: &TempDir) -> Arc<DiskCache> {
    let cache = Arc::new(DiskCache::new(dir.path().join("responses"), 1 << 20));
    cache.initialize().unwrap();
    cache
}

fn not_modified(body: &str) -> NetworkResponse {
    NetworkResponse::new(304, body.as_bytes().to_vec(), Headers::new(), true, Duration::ZERO)
}

#[test]
fn miss_is_fetched_then_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let cache = disk_cache(&dir);
    let network = ScriptedNetwork::new(vec![Ok(fresh("hello"))]);
    let (tx, rx) = channel();
    let queue = started_queue(cache.clone(), network.clone(), 2, &tx);

    queue.admit(Request::get("https://example.com/a", Recorder::new(&tx)));
    assert_eq!(next_callback(&rx), Event::Response("hello".into()));
    assert_eq!(next_finish(&rx), FinishReason::Done);
    assert!(cache.get("https://example.com/a").is_some());

    queue.admit(Request::get("https://example.com/a", Recorder::new(&tx)));
    assert_eq!(next_callback(&rx), Event::Response("hello".into()));
    assert_eq!(next_finish(&rx), FinishReason::Done);
    assert_eq!(network.calls().len(), 1);
    assert_eq!(queue.active_count(), 0);
}

#[test]
fn soft_stale_hit_delivers_twice() {
    let dir = TempDir::new().unwrap();
    let cache = disk_cache(&dir);
    let mut stale = entry("stale", 60_000, -1_000);
    stale.etag = Some("\"v1\"".into());
    cache.put("https://example.com/a", &stale).unwrap();

    let network = ScriptedNetwork::new(vec![Ok(fresh("fresh"))]);
    let (tx, rx) = channel();
    let queue = started_queue(cache.clone(), network.clone(), 1, &tx);

    queue.admit(Request::get("https://example.com/a", Recorder::new(&tx)));
    assert_eq!(next(&rx), Event::Response("stale".into()));
    assert_eq!(next(&rx), Event::Response("fresh".into()));
    assert!(matches!(next(&rx), Event::Finished(Some(1), FinishReason::Done)));
    assert_quiet(&rx);

    let calls = network.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].extra_headers.get("If-None-Match").map(String::as_str), Some("\"v1\""));
    assert_eq!(cache.get("https://example.com/a").unwrap().data, b"fresh");
}

#[test]
fn not_modified_after_stale_delivery_is_silent() {
    let dir = TempDir::new().unwrap();
    let cache = disk_cache(&dir);
    let mut stale = entry("stale", 60_000, -1_000);
    stale.etag = Some("\"v1\"".into());
    cache.put("https://example.com/a", &stale).unwrap();

    let network = ScriptedNetwork::new(vec![Ok(not_modified("stale"))]);
    let (tx, rx) = channel();
    let queue = started_queue(cache.clone(), network.clone(), 1, &tx);

    queue.admit(Request::get("https://example.com/a", Recorder::new(&tx)));
    assert_eq!(next(&rx), Event::Response("stale".into()));
    assert_eq!(next_finish(&rx), FinishReason::NotModified);
    assert_quiet(&rx);
    // No write-through on 304.
    assert_eq!(cache.get("https://example.com/a").unwrap().soft_ttl, stale.soft_ttl);
}

#[test]
fn hard_expiry_takes_precedence_over_soft() {
    let dir = TempDir::new().unwrap();
    let cache = disk_cache(&dir);
    let mut expired = entry("old", -1_000, 60_000);
    expired.etag = Some("\"v0\"".into());
    expired.last_modified = 784_111_777_000;
    cache.put("https://example.com/a", &expired).unwrap();

    let network = ScriptedNetwork::new(vec![Ok(fresh("new"))]);
    let (tx, rx) = channel();
    let queue = started_queue(cache.clone(), network.clone(), 1, &tx);

    queue.admit(Request::get("https://example.com/a", Recorder::new(&tx)));
    assert_eq!(next(&rx), Event::Response("new".into()));
    assert_eq!(next_finish(&rx), FinishReason::Done);
    assert_quiet(&rx);

    let calls = network.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].extra_headers.get("If-None-Match").map(String::as_str), Some("\"v0\""));
    assert_eq!(
        calls[0].extra_headers.get("If-Modified-Since").map(String::as_str),
        Some("Sun, 06 Nov 1994 08:49:37 GMT")
    );
}

#[test]
fn not_modified_without_prior_delivery_is_delivered() {
    let dir = TempDir::new().unwrap();
    let cache = disk_cache(&dir);
    cache.put("https://example.com/a", &entry("old", -1_000, -1_000)).unwrap();

    let network = ScriptedNetwork::new(vec![Ok(not_modified("old"))]);
    let (tx, rx) = channel();
    let queue = started_queue(cache, network, 1, &tx);

    queue.admit(Request::get("https://example.com/a", Recorder::new(&tx)));
    assert_eq!(next_callback(&rx), Event::Response("old".into()));
    assert_eq!(next_finish(&rx), FinishReason::Done);
}

#[test]
fn unparseable_cached_body_is_purged_and_refetched() {
    let dir = TempDir::new().unwrap();
    let cache = disk_cache(&dir);
    let mut bad = entry("", 60_000, 60_000);
    bad.data = vec![0xFF, 0xFE];
    cache.put("https://example.com/a", &bad).unwrap();

    let network = ScriptedNetwork::new(vec![Ok(fresh("good"))]);
    let (tx, rx) = channel();
    let queue = started_queue(cache.clone(), network.clone(), 1, &tx);

    queue.admit(Request::get("https://example.com/a", Recorder::new(&tx)));
    assert_eq!(next_callback(&rx), Event::Response("good".into()));
    assert_eq!(network.calls().len(), 1);
    assert_eq!(cache.get("https://example.com/a").unwrap().data, b"good");
}

#[test]
fn uncacheable_response_is_not_stored() {
    let dir = TempDir::new().unwrap();
    let cache = disk_cache(&dir);
    let network = ScriptedNetwork::new(vec![Ok(fresh("x"))]);
    let (tx, rx) = channel();
    let queue = started_queue(cache.clone(), network, 1, &tx);

    queue.admit(
        Request::get("https://example.com/a", Recorder::new(&tx)).with_should_cache(false),
    );
    assert_eq!(next_callback(&rx), Event::Response("x".into()));
    assert!(cache.get("https://example.com/a").is_none());
}

#[test]
fn custom_cache_key_is_used() {
    let dir = TempDir::new().unwrap();
    let cache = disk_cache(&dir);
    let network = ScriptedNetwork::new(vec![Ok(fresh("keyed"))]);
    let (tx, rx) = channel();
    let queue = started_queue(cache.clone(), network, 1, &tx);

    queue.admit(
        Request::get("https://example.com/a?session=1", Recorder::new(&tx)).with_cache_key("a"),
    );
    assert_eq!(next_callback(&rx), Event::Response("keyed".into()));
    assert!(cache.get("a").is_some());
    assert!(cache.get("https://example.com/a?session=1").is_none());
}
