//! Per-request state shared by every request type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cache::{CacheEntry, Headers};
use crate::scheduler::Priority;

use super::error::RequestError;
use super::retry::{DefaultRetryPolicy, RetryConfig, RetryDecision, RetryPolicy};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Patch => "PATCH",
        }
    }
}

/// Error returned when a sequence number is assigned twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sequence already assigned ({existing})")]
pub struct SequenceAssigned {
    pub existing: u64,
}

/// Identity, scheduling attributes and mutable delivery state of a request.
///
/// Flags are atomics so that cancellation can be requested from any thread
/// while dispatcher threads read them at their checkpoints.
pub struct RequestCore {
    method: Method,
    url: String,
    cache_key: String,
    priority: Priority,
    headers: Headers,
    body: Option<Vec<u8>>,
    tag: Option<String>,
    should_cache: bool,
    retry_server_errors: bool,
    sequence: OnceLock<u64>,
    canceled: AtomicBool,
    delivered: AtomicBool,
    finished: AtomicBool,
    retry_policy: Mutex<Box<dyn RetryPolicy>>,
    custom_retry_policy: bool,
    cache_entry: Mutex<Option<CacheEntry>>,
}

impl std::fmt::Debug for RequestCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCore")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

impl RequestCore {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method,
            cache_key: url.clone(),
            url,
            priority: Priority::Normal,
            headers: Headers::new(),
            body: None,
            tag: None,
            should_cache: true,
            retry_server_errors: false,
            sequence: OnceLock::new(),
            canceled: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            retry_policy: Mutex::new(Box::new(DefaultRetryPolicy::default())),
            custom_retry_policy: false,
            cache_entry: Mutex::new(None),
        }
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub(crate) fn set_cache_key(&mut self, key: String) {
        self.cache_key = key;
    }

    pub(crate) fn set_should_cache(&mut self, should_cache: bool) {
        self.should_cache = should_cache;
    }

    pub(crate) fn set_retry_server_errors(&mut self, retry: bool) {
        self.retry_server_errors = retry;
    }

    pub(crate) fn set_retry_policy(&mut self, policy: Box<dyn RetryPolicy>) {
        *self.retry_policy.get_mut() = policy;
        self.custom_retry_policy = true;
    }

    /// Replace the built-in policy with one built from `config`, unless the
    /// caller supplied a policy of their own.
    pub(crate) fn install_default_retry_policy(&self, config: &RetryConfig) {
        if !self.custom_retry_policy {
            *self.retry_policy.lock() = Box::new(DefaultRetryPolicy::from_config(config));
        }
    }

    pub(crate) fn set_tag(&mut self, tag: String) {
        self.tag = Some(tag);
    }

    pub(crate) fn insert_header(&mut self, name: String, value: String) {
        self.headers.insert(name, value);
    }

    pub(crate) fn set_body(&mut self, body: Vec<u8>) {
        self.body = Some(body);
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Headers supplied by the caller, sent on every attempt.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn should_cache(&self) -> bool {
        self.should_cache
    }

    pub fn should_retry_server_errors(&self) -> bool {
        self.retry_server_errors
    }

    /// Admission sequence number, `None` until the request is admitted.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence.get().copied()
    }

    pub(crate) fn assign_sequence(&self, sequence: u64) -> Result<(), SequenceAssigned> {
        self.sequence
            .set(sequence)
            .map_err(|_| SequenceAssigned { existing: self.sequence().unwrap_or(sequence) })
    }

    /// Request cancellation. Takes effect at the next dispatch checkpoint; a
    /// transport call already in progress runs to completion and its result
    /// is dropped before delivery.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_delivered(&self) {
        self.delivered.store(true, Ordering::Release);
    }

    /// True once any response (intermediate or final) was handed to delivery.
    pub fn has_had_response_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    /// Flip the finished flag. Returns false if the request already finished.
    pub(crate) fn mark_finished(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Timeout the transport should honor for the current attempt.
    pub fn timeout(&self) -> Duration {
        self.retry_policy.lock().current_timeout()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_policy.lock().current_retry_count()
    }

    pub(crate) fn prepare_next_attempt(&self, error: RequestError) -> RetryDecision {
        self.retry_policy.lock().prepare_next_attempt(error)
    }

    /// Entry annotated during cache triage, used for conditional revalidation.
    pub fn cache_entry(&self) -> Option<CacheEntry> {
        self.cache_entry.lock().clone()
    }

    pub(crate) fn set_cache_entry(&self, entry: CacheEntry) {
        *self.cache_entry.lock() = Some(entry);
    }
}
