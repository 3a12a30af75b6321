//! Cache triage thread.
//!
//! Serves fresh entries directly, serves soft-stale entries and then sends
//! the request on for revalidation, and forwards misses and hard-expired
//! entries to the network queue. Never touches the network.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::queue::{FinishReason, QueueCore};
use crate::delivery::{ExecutorDelivery, FinishRequest};
use crate::request::{Dispatch, NetworkResponse};
use crate::telemetry::metrics;

pub(crate) struct CacheDispatcher {
    queue: Arc<QueueCore>,
    delivery: ExecutorDelivery,
    quit: Arc<AtomicBool>,
}

impl CacheDispatcher {
    pub(crate) fn new(queue: Arc<QueueCore>, delivery: ExecutorDelivery, quit: Arc<AtomicBool>) -> Self {
        Self { queue, delivery, quit }
    }

    pub(crate) fn run(self) {
        debug!("cache dispatcher started");
        if let Err(err) = self.queue.cache.initialize() {
            warn!(error = %err, "cache initialization failed, continuing with an empty cache");
        }

        while let Some(request) = self.queue.cache_queue.pop_blocking(&self.quit) {
            self.process(request);
        }
        debug!("cache dispatcher exiting");
    }

    fn process(&self, request: Arc<dyn Dispatch>) {
        let core = request.core();
        let sequence = core.sequence();
        trace!(sequence, "cache-queue-take");

        if core.is_canceled() {
            self.queue.finish(&request, FinishReason::CacheDiscardCanceled);
            return;
        }

        let Some(entry) = self.queue.cache.get(core.cache_key()) else {
            trace!(sequence, "cache-miss");
            metrics::record_cache_triage("miss");
            self.queue.network_queue.push(request);
            return;
        };

        if entry.is_expired() {
            trace!(sequence, "cache-hit-expired");
            metrics::record_cache_triage("expired");
            core.set_cache_entry(entry);
            self.queue.network_queue.push(request);
            return;
        }

        trace!(sequence, "cache-hit");
        let mut response =
            Arc::clone(&request).parse_network_response(&NetworkResponse::from_cache(&entry));
        if let Err(err) = &response.result {
            warn!(sequence, key = core.cache_key(), error = %err, "cached body rejected, refetching");
            metrics::record_cache_triage("unparseable");
            self.queue.cache.remove(core.cache_key());
            self.queue.network_queue.push(request);
            return;
        }
        trace!(sequence, "cache-hit-parsed");

        if !entry.refresh_needed() {
            metrics::record_cache_triage("hit");
            self.delivery.post_response(request, response, None);
            return;
        }

        trace!(sequence, "cache-hit-refresh-needed");
        metrics::record_cache_triage("soft_stale");
        core.set_cache_entry(entry);
        response.intermediate = true;

        let queue = Arc::clone(&self.queue);
        let revalidate = Arc::clone(&request);
        self.delivery.post_response(
            request,
            response,
            Some(Box::new(move || queue.network_queue.push(revalidate))),
        );
    }
}
