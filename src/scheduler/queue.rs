//! Request queue: admission, deduplication staging and dispatcher lifecycle.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::cache_dispatcher::CacheDispatcher;
use super::dispatch_queue::DispatchQueue;
use super::network_dispatcher::NetworkDispatcher;
use crate::cache::Cache;
use crate::delivery::{Executor, ExecutorDelivery, FinishRequest, InlineExecutor};
use crate::network::Network;
use crate::request::{Dispatch, Request, RequestCore, RequestHandler, RetryConfig};
use crate::telemetry::metrics;

/// Default number of network dispatcher threads.
pub const DEFAULT_NETWORK_THREADS: usize = 4;

/// Why a request left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishReason {
    /// Canceled before the cache lookup.
    CacheDiscardCanceled,
    /// Canceled before the transport call.
    NetworkDiscardCanceled,
    /// Revalidation returned 304 after a response was already delivered.
    NotModified,
    /// Canceled between parsing and the callback.
    CanceledAtDelivery,
    /// Final response or error delivered.
    Done,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheDiscardCanceled => "cache-discard-canceled",
            Self::NetworkDiscardCanceled => "network-discard-canceled",
            Self::NotModified => "not-modified",
            Self::CanceledAtDelivery => "canceled-at-delivery",
            Self::Done => "done",
        }
    }
}

/// Errors raised by queue lifecycle operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to spawn dispatcher thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Callback invoked once per request when it finishes.
pub type FinishedListener = Arc<dyn Fn(&RequestCore, FinishReason) + Send + Sync>;

/// Handle for removing a finished listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Configuration for the request queue.
#[derive(Debug, Clone)]
pub struct RequestQueueConfig {
    pub network_threads: usize,
    /// Retry policy installed on admitted requests that did not set their own.
    pub retry: RetryConfig,
}

impl Default for RequestQueueConfig {
    fn default() -> Self {
        Self { network_threads: DEFAULT_NETWORK_THREADS, retry: RetryConfig::default() }
    }
}

impl RequestQueueConfig {
    pub fn with_network_threads(network_threads: usize) -> Self {
        Self { network_threads, ..Self::default() }
    }
}

/// State shared by the queue front-end and its dispatcher threads.
pub(crate) struct QueueCore {
    sequence: AtomicU64,
    active: DashMap<u64, Arc<dyn Dispatch>>,
    /// Cache key -> requests waiting behind the one in flight. Presence of a
    /// key (even with an empty list) marks that key as in flight.
    staging: Mutex<HashMap<String, VecDeque<Arc<dyn Dispatch>>>>,
    listeners: RwLock<Vec<(ListenerId, FinishedListener)>>,
    next_listener: AtomicU64,
    retry: RetryConfig,
    pub(crate) cache_queue: DispatchQueue,
    pub(crate) network_queue: DispatchQueue,
    pub(crate) cache: Arc<dyn Cache>,
}

impl QueueCore {
    fn new(cache: Arc<dyn Cache>, retry: RetryConfig) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            active: DashMap::new(),
            staging: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            retry,
            cache_queue: DispatchQueue::new("cache"),
            network_queue: DispatchQueue::new("network"),
            cache,
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn admit(&self, request: Arc<dyn Dispatch>) {
        let core = request.core();
        let sequence = match core.assign_sequence(self.next_sequence()) {
            Ok(()) => core.sequence().unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "request admitted twice, keeping its sequence");
                err.existing
            }
        };
        core.install_default_retry_policy(&self.retry);
        self.active.insert(sequence, Arc::clone(&request));
        trace!(sequence, url = core.url(), priority = core.priority().as_str(), "add-to-queue");

        if !core.should_cache() {
            self.network_queue.push(request);
            return;
        }

        {
            let mut staging = self.staging.lock();
            match staging.entry(core.cache_key().to_string()) {
                Entry::Occupied(mut waiting) => {
                    waiting.get_mut().push_back(request);
                    trace!(sequence, "request staged behind in-flight duplicate");
                    return;
                }
                Entry::Vacant(slot) => {
                    slot.insert(VecDeque::new());
                }
            }
        }
        self.cache_queue.push(request);
    }

    fn add_listener(&self, listener: FinishedListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

impl FinishRequest for QueueCore {
    fn finish(&self, request: &Arc<dyn Dispatch>, reason: FinishReason) {
        let core = request.core();
        if !core.mark_finished() {
            debug!(sequence = core.sequence(), reason = reason.as_str(), "duplicate finish ignored");
            return;
        }
        if let Some(sequence) = core.sequence() {
            self.active.remove(&sequence);
        }
        metrics::record_finished(reason.as_str());
        trace!(sequence = core.sequence(), reason = reason.as_str(), "finish");

        let listeners: Vec<FinishedListener> =
            self.listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(core, reason);
        }

        if core.should_cache() {
            let waiting = self.staging.lock().remove(core.cache_key());
            if let Some(waiting) = waiting {
                if !waiting.is_empty() {
                    debug!(
                        key = core.cache_key(),
                        released = waiting.len(),
                        "releasing staged requests"
                    );
                }
                for request in waiting {
                    self.cache_queue.push(request);
                }
            }
        }
    }
}

struct Workers {
    quit: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Signal, wake and join. The calling thread is never joined.
    fn shutdown(self, core: &QueueCore) {
        self.quit.store(true, Ordering::Release);
        core.cache_queue.wake_all();
        core.network_queue.wake_all();
        let current = thread::current().id();
        for handle in self.handles {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().map(str::to_string);
            if handle.join().is_err() {
                warn!(thread = ?name, "dispatcher thread panicked");
            }
        }
    }
}

/// Admission point for requests.
///
/// Cacheable requests go through the cache dispatcher first, with duplicates
/// of an in-flight cache key held back until it finishes. Non-cacheable
/// requests go straight to the network dispatchers.
pub struct RequestQueue {
    core: Arc<QueueCore>,
    network: Arc<dyn Network>,
    executor: Arc<dyn Executor>,
    config: RequestQueueConfig,
    workers: Mutex<Option<Workers>>,
}

impl RequestQueue {
    /// Create a queue that delivers on the dispatcher threads.
    pub fn new(cache: Arc<dyn Cache>, network: Arc<dyn Network>, config: RequestQueueConfig) -> Self {
        Self::with_executor(cache, network, config, Arc::new(InlineExecutor))
    }

    pub fn with_executor(
        cache: Arc<dyn Cache>,
        network: Arc<dyn Network>,
        config: RequestQueueConfig,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            core: Arc::new(QueueCore::new(cache, config.retry)),
            network,
            executor,
            config,
            workers: Mutex::new(None),
        }
    }

    /// Start the cache dispatcher and network dispatchers, stopping any that
    /// are already running.
    pub fn start(&self) -> Result<(), QueueError> {
        self.stop();

        let mut workers = Workers { quit: Arc::new(AtomicBool::new(false)), handles: Vec::new() };
        let finisher: Arc<dyn FinishRequest> = self.core.clone();
        let delivery = ExecutorDelivery::new(Arc::clone(&self.executor), finisher);

        let cache_dispatcher =
            CacheDispatcher::new(Arc::clone(&self.core), delivery.clone(), workers.quit.clone());
        if let Err(err) = spawn(&mut workers, "courier-cache".to_string(), move || {
            cache_dispatcher.run()
        }) {
            workers.shutdown(&self.core);
            return Err(err);
        }

        let threads = self.config.network_threads.max(1);
        for id in 0..threads {
            let dispatcher = NetworkDispatcher::new(
                id,
                Arc::clone(&self.core),
                Arc::clone(&self.network),
                delivery.clone(),
                workers.quit.clone(),
            );
            if let Err(err) =
                spawn(&mut workers, format!("courier-network-{id}"), move || dispatcher.run())
            {
                workers.shutdown(&self.core);
                return Err(err);
            }
        }

        debug!(network_threads = threads, "request queue started");
        *self.workers.lock() = Some(workers);
        Ok(())
    }

    /// Stop and join all dispatcher threads. Queued requests stay queued.
    pub fn stop(&self) {
        let workers = self.workers.lock().take();
        if let Some(workers) = workers {
            workers.shutdown(&self.core);
            debug!("request queue stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.workers.lock().is_some()
    }

    /// Admit a request. Returns a shared handle usable for cancellation.
    pub fn admit<H: RequestHandler>(&self, request: Request<H>) -> Arc<Request<H>> {
        let request = Arc::new(request);
        let dispatch: Arc<dyn Dispatch> = request.clone();
        self.core.admit(dispatch);
        request
    }

    /// Finish a request out of band.
    pub fn finish<H: RequestHandler>(&self, request: &Arc<Request<H>>, reason: FinishReason) {
        let dispatch: Arc<dyn Dispatch> = request.clone();
        self.core.finish(&dispatch, reason);
    }

    /// Cancel every active request carrying `tag`.
    pub fn cancel_all(&self, tag: &str) -> usize {
        self.cancel_all_matching(|core| core.tag() == Some(tag))
    }

    /// Cancel every active request matching `filter`. Returns how many matched.
    pub fn cancel_all_matching<F>(&self, filter: F) -> usize
    where
        F: Fn(&RequestCore) -> bool,
    {
        let mut canceled = 0;
        for entry in self.core.active.iter() {
            let core = entry.value().core();
            if filter(core) {
                core.cancel();
                canceled += 1;
            }
        }
        canceled
    }

    pub fn add_finished_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&RequestCore, FinishReason) + Send + Sync + 'static,
    {
        self.core.add_listener(Arc::new(listener))
    }

    /// Returns false if no listener had this id.
    pub fn remove_finished_listener(&self, id: ListenerId) -> bool {
        self.core.remove_listener(id)
    }

    /// Admitted requests that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.core.active.len()
    }

    /// Requests waiting behind an in-flight request for `cache_key`.
    pub fn staged_count(&self, cache_key: &str) -> usize {
        self.core.staging.lock().get(cache_key).map_or(0, VecDeque::len)
    }

    /// True while a request for `cache_key` is in flight.
    pub fn is_in_flight(&self, cache_key: &str) -> bool {
        self.core.staging.lock().contains_key(cache_key)
    }

    /// Requests waiting in the (cache, network) dispatch queues.
    pub fn pending(&self) -> (usize, usize) {
        (self.core.cache_queue.len(), self.core.network_queue.len())
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.core.cache
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("network_threads", &self.config.network_threads)
            .field("active", &self.active_count())
            .field("running", &self.is_running())
            .finish()
    }
}

fn spawn<F>(workers: &mut Workers, name: String, body: F) -> Result<(), QueueError>
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|source| QueueError::Spawn { name, source })?;
    workers.handles.push(handle);
    Ok(())
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
