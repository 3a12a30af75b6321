//! Blocking priority queue shared between the request queue and dispatchers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::priority::PriorityQueue;
use crate::request::Dispatch;

/// Priority queue of type-erased requests with blocking pop.
pub struct DispatchQueue {
    name: &'static str,
    inner: Mutex<PriorityQueue<Arc<dyn Dispatch>>>,
    available: Condvar,
}

impl DispatchQueue {
    pub fn new(name: &'static str) -> Self {
        Self { name, inner: Mutex::new(PriorityQueue::new()), available: Condvar::new() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue by the request's priority and sequence.
    pub fn push(&self, request: Arc<dyn Dispatch>) {
        let core = request.core();
        let priority = core.priority();
        let sequence = core.sequence().unwrap_or(0);
        self.inner.lock().push(request, priority, sequence);
        self.available.notify_one();
    }

    /// Wait for the next request. Returns `None` once `quit` is set; queued
    /// requests are left in place.
    pub fn pop_blocking(&self, quit: &AtomicBool) -> Option<Arc<dyn Dispatch>> {
        let mut queue = self.inner.lock();
        loop {
            if quit.load(Ordering::Acquire) {
                return None;
            }
            if let Some(request) = queue.pop() {
                return Some(request);
            }
            self.available.wait(&mut queue);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Wake every waiter so it can observe its quit flag.
    pub fn wake_all(&self) {
        let _guard = self.inner.lock();
        self.available.notify_all();
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue").field("name", &self.name).field("len", &self.len()).finish()
    }
}
