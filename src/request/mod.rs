//! Requests: identity, scheduling attributes, handlers and retry state.

mod error;
mod handler;
pub mod handlers;
mod response;
mod retry;
mod state;

pub use error::{ErrorKind, RequestError};
pub use handler::{Deliverable, Dispatch, Request, RequestHandler};
pub use handlers::{JsonRequest, StringRequest};
pub use response::{NetworkResponse, Response};
pub use retry::{
    DefaultRetryPolicy, RetryConfig, RetryDecision, RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT,
};
pub use state::{Method, RequestCore, SequenceAssigned};
