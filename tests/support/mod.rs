//! Shared fixtures for queue integration tests: a scripted transport, a
//! recording handler and a manually drained executor.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use courier_core::cache::headers::parse_cache_headers;
use courier_core::cache::{now_millis, Cache, CacheEntry, Headers};
use courier_core::delivery::{Executor, Job};
use courier_core::network::Network;
use courier_core::request::{ErrorKind, NetworkResponse, RequestCore, RequestError, RequestHandler};
use courier_core::scheduler::{FinishReason, RequestQueue, RequestQueueConfig};

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Response(String),
    Error(ErrorKind),
    Finished(Option<u64>, FinishReason),
}

/// Transport attempt as seen by [`ScriptedNetwork`].
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub extra_headers: Headers,
    pub timeout: Duration,
}

/// Replies from a script; once the script is exhausted every call returns a
/// fresh `200` cacheable for a minute. Optionally blocks until opened.
pub struct ScriptedNetwork {
    replies: Mutex<VecDeque<Result<NetworkResponse, RequestError>>>,
    calls: Mutex<Vec<Call>>,
    gate: Option<(Mutex<bool>, Condvar)>,
    entered: (Mutex<usize>, Condvar),
}

impl ScriptedNetwork {
    pub fn new(replies: Vec<Result<NetworkResponse, RequestError>>) -> Arc<Self> {
        Arc::new(Self::build(replies, None))
    }

    pub fn gated(replies: Vec<Result<NetworkResponse, RequestError>>) -> Arc<Self> {
        Arc::new(Self::build(replies, Some((Mutex::new(false), Condvar::new()))))
    }

    fn build(
        replies: Vec<Result<NetworkResponse, RequestError>>,
        gate: Option<(Mutex<bool>, Condvar)>,
    ) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            gate,
            entered: (Mutex::new(0), Condvar::new()),
        }
    }

    pub fn open(&self) {
        if let Some((open, cv)) = &self.gate {
            *open.lock() = true;
            cv.notify_all();
        }
    }

    /// Block until `n` calls have entered the transport.
    pub fn wait_for_calls(&self, n: usize) {
        let (count, cv) = &self.entered;
        let mut count = count.lock();
        while *count < n {
            assert!(!cv.wait_for(&mut count, WAIT).timed_out(), "transport never called");
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl Network for ScriptedNetwork {
    fn perform_request(
        &self,
        request: &RequestCore,
        extra_headers: &Headers,
    ) -> Result<NetworkResponse, RequestError> {
        self.calls.lock().push(Call {
            url: request.url().to_string(),
            extra_headers: extra_headers.clone(),
            timeout: request.timeout(),
        });
        {
            let (count, cv) = &self.entered;
            *count.lock() += 1;
            cv.notify_all();
        }
        if let Some((open, cv)) = &self.gate {
            let mut open = open.lock();
            while !*open {
                cv.wait(&mut open);
            }
        }
        self.replies.lock().pop_front().unwrap_or_else(|| Ok(fresh("fresh")))
    }
}

/// A `200` with the given body, cacheable for sixty seconds.
pub fn fresh(body: &str) -> NetworkResponse {
    NetworkResponse::ok(body).with_header("Cache-Control", "max-age=60")
}

/// Handler that reports every callback on a channel.
pub struct Recorder {
    events: Mutex<Sender<Event>>,
}

impl Recorder {
    pub fn new(events: &Sender<Event>) -> Self {
        Self { events: Mutex::new(events.clone()) }
    }
}

impl RequestHandler for Recorder {
    type Output = String;

    fn parse_network_response(
        &self,
        response: &NetworkResponse,
    ) -> Result<(String, Option<CacheEntry>), RequestError> {
        let text = String::from_utf8(response.data.clone())
            .map_err(|e| RequestError::Parse(e.to_string()))?;
        Ok((text, parse_cache_headers(response)))
    }

    fn deliver_response(&self, output: String) {
        let _ = self.events.lock().send(Event::Response(output));
    }

    fn deliver_error(&self, error: RequestError) {
        let _ = self.events.lock().send(Event::Error(error.kind()));
    }
}

/// Executor that holds jobs until the test drains them.
#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<Vec<Job>>,
    posted: Condvar,
}

impl ManualExecutor {
    pub fn wait_for_job(&self) {
        let mut jobs = self.jobs.lock();
        while jobs.is_empty() {
            assert!(!self.posted.wait_for(&mut jobs, WAIT).timed_out(), "no job posted");
        }
    }

    pub fn run_all(&self) {
        let jobs: Vec<Job> = std::mem::take(&mut *self.jobs.lock());
        for job in jobs {
            job();
        }
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) {
        self.jobs.lock().push(job);
        self.posted.notify_all();
    }
}

/// A started queue whose finished listener reports on `events`.
pub fn started_queue(
    cache: Arc<dyn Cache>,
    network: Arc<ScriptedNetwork>,
    threads: usize,
    events: &Sender<Event>,
) -> RequestQueue {
    let queue = RequestQueue::new(cache, network, RequestQueueConfig::with_network_threads(threads));
    listen(&queue, events);
    queue.start().unwrap();
    queue
}

pub fn listen(queue: &RequestQueue, events: &Sender<Event>) {
    let sink = Mutex::new(events.clone());
    queue.add_finished_listener(move |core, reason| {
        let _ = sink.lock().send(Event::Finished(core.sequence(), reason));
    });
}

pub fn channel() -> (Sender<Event>, Receiver<Event>) {
    mpsc::channel()
}

/// Receive the next event or fail the test.
pub fn next(rx: &Receiver<Event>) -> Event {
    rx.recv_timeout(WAIT).expect("timed out waiting for event")
}

/// Receive the next callback event, skipping finish notifications.
pub fn next_callback(rx: &Receiver<Event>) -> Event {
    loop {
        match next(rx) {
            Event::Finished(..) => continue,
            other => return other,
        }
    }
}

/// Receive the next finish notification, skipping callbacks.
pub fn next_finish(rx: &Receiver<Event>) -> FinishReason {
    loop {
        if let Event::Finished(_, reason) = next(rx) {
            return reason;
        }
    }
}

pub fn assert_quiet(rx: &Receiver<Event>) {
    if let Ok(event) = rx.recv_timeout(QUIET) {
        panic!("unexpected event: {event:?}");
    }
}

/// An entry holding `body` with expiries offset from now (milliseconds).
pub fn entry(body: &str, ttl_offset: i64, soft_ttl_offset: i64) -> CacheEntry {
    let now = now_millis();
    CacheEntry {
        ttl: now + ttl_offset,
        soft_ttl: now + soft_ttl_offset,
        ..CacheEntry::new(body.as_bytes().to_vec())
    }
}
