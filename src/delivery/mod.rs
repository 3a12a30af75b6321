//! Response delivery on a caller-chosen executor.
//!
//! Parsing happens on dispatcher threads; callbacks run wherever the
//! [`Executor`] puts them. The last cancellation checkpoint sits right
//! before the callback.

use std::sync::Arc;

use tracing::trace;

use crate::request::{Deliverable, Dispatch, RequestError, Response};
use crate::scheduler::FinishReason;
use crate::telemetry::metrics;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs delivery jobs.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs jobs immediately on the calling dispatcher thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Posts jobs onto a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) {
        drop(self.handle.spawn_blocking(job));
    }
}

/// Receives the final lifecycle transition of a request.
pub trait FinishRequest: Send + Sync {
    fn finish(&self, request: &Arc<dyn Dispatch>, reason: FinishReason);
}

/// Posts parsed responses and errors to an executor.
#[derive(Clone)]
pub struct ExecutorDelivery {
    executor: Arc<dyn Executor>,
    finisher: Arc<dyn FinishRequest>,
}

impl ExecutorDelivery {
    pub fn new(executor: Arc<dyn Executor>, finisher: Arc<dyn FinishRequest>) -> Self {
        Self { executor, finisher }
    }

    /// Deliver `response`. A final response finishes the request once its
    /// callback has run; `continuation` runs after the callback either way,
    /// unless the request was canceled before delivery.
    pub fn post_response(
        &self,
        request: Arc<dyn Dispatch>,
        response: Response<Deliverable>,
        continuation: Option<Job>,
    ) {
        request.core().mark_delivered();
        let finisher = Arc::clone(&self.finisher);
        self.executor.execute(Box::new(move || {
            if request.core().is_canceled() {
                finisher.finish(&request, FinishReason::CanceledAtDelivery);
                return;
            }

            let intermediate = response.intermediate;
            match response.result {
                Ok(deliver) => {
                    metrics::record_delivery(if intermediate { "intermediate" } else { "success" });
                    deliver();
                }
                Err(error) => {
                    metrics::record_delivery("error");
                    request.deliver_error(error);
                }
            }

            if intermediate {
                trace!(sequence = request.core().sequence(), "intermediate-response");
            } else {
                finisher.finish(&request, FinishReason::Done);
            }

            if let Some(continuation) = continuation {
                continuation();
            }
        }));
    }

    pub fn post_error(&self, request: Arc<dyn Dispatch>, error: RequestError) {
        trace!(sequence = request.core().sequence(), error = %error, "post-error");
        self.post_response(request, Response::error(error), None);
    }
}

impl std::fmt::Debug for ExecutorDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorDelivery").finish_non_exhaustive()
    }
}
