//! Request scheduling: admission, deduplication, cache triage and the
//! network dispatcher pool.
//!
//! ```text
//! admit ──► cache queue ──► cache dispatcher ──► delivery
//!   │                             │ miss / expired / soft-stale
//!   └──(no cache)──► network queue ◄┘
//!                          │
//!                  network dispatchers ──► cache store + delivery
//! ```

mod cache_dispatcher;
mod dispatch_queue;
mod network_dispatcher;
mod priority;
mod queue;

pub use dispatch_queue::DispatchQueue;
pub use priority::{PrioritizedItem, Priority, PriorityQueue};
pub use queue::{
    FinishReason, FinishedListener, ListenerId, QueueError, RequestQueue, RequestQueueConfig,
    DEFAULT_NETWORK_THREADS,
};
