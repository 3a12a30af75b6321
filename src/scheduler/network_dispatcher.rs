//! Network dispatcher threads.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use super::queue::{FinishReason, QueueCore};
use crate::cache::headers::conditional_headers;
use crate::delivery::{ExecutorDelivery, FinishRequest};
use crate::network::Network;
use crate::request::{Dispatch, NetworkResponse, RequestError, RetryDecision};
use crate::telemetry::{metrics, RequestSpan};

pub(crate) struct NetworkDispatcher {
    id: usize,
    queue: Arc<QueueCore>,
    network: Arc<dyn Network>,
    delivery: ExecutorDelivery,
    quit: Arc<AtomicBool>,
}

impl NetworkDispatcher {
    pub(crate) fn new(
        id: usize,
        queue: Arc<QueueCore>,
        network: Arc<dyn Network>,
        delivery: ExecutorDelivery,
        quit: Arc<AtomicBool>,
    ) -> Self {
        Self { id, queue, network, delivery, quit }
    }

    pub(crate) fn run(self) {
        debug!(worker = self.id, "network dispatcher started");
        while let Some(request) = self.queue.network_queue.pop_blocking(&self.quit) {
            self.process(request);
        }
        debug!(worker = self.id, "network dispatcher exiting");
    }

    fn process(&self, request: Arc<dyn Dispatch>) {
        let core = request.core();
        let sequence = core.sequence();
        trace!(sequence, worker = self.id, "network-queue-take");

        if core.is_canceled() {
            self.queue.finish(&request, FinishReason::NetworkDiscardCanceled);
            return;
        }

        let response = match self.perform_with_retry(request.as_ref()) {
            Ok(response) => response,
            Err(err) => {
                let err = request.parse_network_error(err);
                self.delivery.post_error(request, err);
                return;
            }
        };
        trace!(sequence, status = response.status, "network-http-complete");

        if response.not_modified && core.has_had_response_delivered() {
            self.queue.finish(&request, FinishReason::NotModified);
            return;
        }

        let parsed = Arc::clone(&request).parse_network_response(&response);
        trace!(sequence, "network-parse-complete");

        if core.should_cache() {
            if let Some(entry) = &parsed.cache_entry {
                match self.queue.cache.put(core.cache_key(), entry) {
                    Ok(()) => trace!(sequence, "network-cache-written"),
                    Err(err) => warn!(sequence, error = %err, "failed to write cache entry"),
                }
            }
        }

        self.delivery.post_response(request, parsed, None);
    }

    /// Run transport attempts until one succeeds, the error is not retryable
    /// or the retry policy gives up.
    fn perform_with_retry(&self, request: &dyn Dispatch) -> Result<NetworkResponse, RequestError> {
        let core = request.core();
        loop {
            let extra = conditional_headers(core.cache_entry().as_ref());
            let span = RequestSpan::new(core.sequence().unwrap_or_default(), core.url());
            let started = Instant::now();
            let result = span.in_scope(|| self.network.perform_request(core, &extra));
            let elapsed = started.elapsed();
            RequestSpan::record_attempt(&span, &result, elapsed);
            metrics::record_network_latency(elapsed);

            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            if !err.is_retryable(core.should_retry_server_errors()) {
                return Err(err);
            }

            let kind = err.kind().as_str();
            match core.prepare_next_attempt(err) {
                RetryDecision::Retry => {
                    metrics::record_retry(kind);
                    debug!(
                        sequence = core.sequence(),
                        kind,
                        retry_count = core.retry_count(),
                        timeout_ms = core.timeout().as_millis() as u64,
                        "retrying request"
                    );
                }
                RetryDecision::Exhausted(err) => return Err(err),
            }
        }
    }
}
