//! Courier Core
//!
//! A client-side HTTP request scheduler. Requests are admitted into a
//! priority-ordered pipeline, triaged against a disk-backed response cache,
//! sent through a pluggable transport with retry, and delivered to typed
//! callbacks on a caller-chosen executor.
//!
//! # Pipeline
//!
//! - **Admission**: [`RequestQueue::admit`] assigns a sequence number and
//!   holds back duplicates of an in-flight cache key.
//! - **Cache triage**: one thread serves fresh entries, serves soft-stale
//!   entries and revalidates them, and forwards misses.
//! - **Network**: a pool of threads performs transport attempts with
//!   conditional headers and writes cacheable results through to the store.
//! - **Delivery**: callbacks run on an [`delivery::Executor`], with a final
//!   cancellation check right before each one.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use courier_core::{new_request_queue, CourierConfig, Request, StringRequest};
//! # use courier_core::network::{HttpResponse, HttpStack, StackError, BasicNetwork};
//! # use courier_core::request::RequestCore;
//! # use courier_core::cache::Headers;
//! # struct Stack;
//! # impl HttpStack for Stack {
//! #     fn execute(&self, _: &RequestCore, _: &Headers, _: std::time::Duration)
//! #         -> Result<HttpResponse, StackError> { Err(StackError::Timeout) }
//! # }
//!
//! let config = CourierConfig::default();
//! let queue = new_request_queue(&config, Arc::new(BasicNetwork::new(Stack)))?;
//! let handler = StringRequest::new(|body| println!("{body}"), |err| eprintln!("{err}"));
//! let request = queue.admit(Request::get("https://example.com/", handler).with_tag("home"));
//! request.cancel();
//! # Ok::<(), courier_core::scheduler::QueueError>(())
//! ```

pub mod cache;
pub mod config;
pub mod delivery;
pub mod network;
pub mod request;
pub mod scheduler;
pub mod telemetry;

use std::sync::Arc;

pub use cache::{Cache, CacheEntry, CacheError, DiskCache, NoCache};
pub use config::{ConfigError, CourierConfig};
pub use delivery::{InlineExecutor, TokioExecutor};
pub use network::{BasicNetwork, Network};
pub use request::{
    JsonRequest, Method, Request, RequestError, RequestHandler, Response, StringRequest,
};
pub use scheduler::{FinishReason, Priority, QueueError, RequestQueue};

/// Build and start a request queue from configuration, delivering on the
/// dispatcher threads.
pub fn new_request_queue(
    config: &CourierConfig,
    network: Arc<dyn Network>,
) -> Result<RequestQueue, QueueError> {
    let queue = RequestQueue::new(config.cache_store(), network, config.queue_config());
    queue.start()?;
    Ok(queue)
}
