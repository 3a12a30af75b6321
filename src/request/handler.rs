//! Request handlers and the type-erased dispatch interface.
//!
//! A [`RequestHandler`] supplies the per-type capabilities (parse a raw
//! response, enrich an error, deliver a result or an error). [`Request`]
//! pairs a handler with its [`RequestCore`]; the scheduler only ever sees
//! requests through the object-safe [`Dispatch`] trait.

use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::scheduler::Priority;

use super::error::RequestError;
use super::response::{NetworkResponse, Response};
use super::retry::RetryPolicy;
use super::state::{Method, RequestCore};

/// Capabilities of one request type.
pub trait RequestHandler: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Turn a raw response into a typed result and an optional cache entry.
    fn parse_network_response(
        &self,
        response: &NetworkResponse,
    ) -> Result<(Self::Output, Option<CacheEntry>), RequestError>;

    /// Enrich a transport error before it is delivered.
    fn parse_network_error(&self, error: RequestError) -> RequestError {
        error
    }

    fn deliver_response(&self, output: Self::Output);

    fn deliver_error(&self, error: RequestError);
}

/// A parsed result bound to its handler, ready to run on the delivery executor.
pub type Deliverable = Box<dyn FnOnce() + Send + 'static>;

/// Object-safe view of a request used by queues and dispatchers.
pub trait Dispatch: Send + Sync + 'static {
    fn core(&self) -> &RequestCore;

    /// Parse on the calling (dispatcher) thread; delivery happens later.
    fn parse_network_response(self: Arc<Self>, response: &NetworkResponse) -> Response<Deliverable>;

    fn parse_network_error(&self, error: RequestError) -> RequestError;

    fn deliver_error(&self, error: RequestError);
}

/// A typed request: shared core state plus the handler for its payload.
pub struct Request<H> {
    core: RequestCore,
    handler: H,
}

impl<H: RequestHandler> Request<H> {
    pub fn new(method: Method, url: impl Into<String>, handler: H) -> Self {
        Self { core: RequestCore::new(method, url), handler }
    }

    pub fn get(url: impl Into<String>, handler: H) -> Self {
        Self::new(Method::Get, url, handler)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.core.set_priority(priority);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.core.set_cache_key(key.into());
        self
    }

    pub fn with_should_cache(mut self, should_cache: bool) -> Self {
        self.core.set_should_cache(should_cache);
        self
    }

    pub fn with_retry_server_errors(mut self, retry: bool) -> Self {
        self.core.set_retry_server_errors(retry);
        self
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.core.set_retry_policy(Box::new(policy));
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.core.set_tag(tag.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.core.insert_header(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.core.set_body(body.into());
        self
    }

    pub fn core(&self) -> &RequestCore {
        &self.core
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.core.is_canceled()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.core.sequence()
    }
}

impl<H> std::fmt::Debug for Request<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").field("core", &self.core).finish_non_exhaustive()
    }
}

impl<H: RequestHandler> Dispatch for Request<H> {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn parse_network_response(self: Arc<Self>, response: &NetworkResponse) -> Response<Deliverable> {
        match self.handler.parse_network_response(response) {
            Ok((output, cache_entry)) => {
                let request = Arc::clone(&self);
                let deliver: Deliverable =
                    Box::new(move || request.handler.deliver_response(output));
                Response::success(deliver, cache_entry)
            }
            Err(error) => Response::error(error),
        }
    }

    fn parse_network_error(&self, error: RequestError) -> RequestError {
        self.handler.parse_network_error(error)
    }

    fn deliver_error(&self, error: RequestError) {
        self.handler.deliver_error(error);
    }
}
