//! Request prioritization.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Scheduling priority of a request. Higher priorities are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Immediate = 3,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Immediate => "immediate",
        }
    }
}

/// Heap slot: the payload plus the key it is ordered by.
#[derive(Debug)]
pub struct PrioritizedItem<T> {
    pub priority: Priority,
    pub sequence: u64,
    pub item: T,
}

impl<T> PrioritizedItem<T> {
    /// Larger keys pop first: higher priority, then the older sequence.
    fn key(&self) -> (Priority, Reverse<u64>) {
        (self.priority, Reverse(self.sequence))
    }
}

impl<T> PartialEq for PrioritizedItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for PrioritizedItem<T> {}

impl<T> PartialOrd for PrioritizedItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PrioritizedItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Max-heap ordered by priority, then by ascending sequence.
///
/// Sequences come from the caller so that re-queued items keep their place.
pub struct PriorityQueue<T> {
    heap: BinaryHeap<PrioritizedItem<T>>,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new() }
    }

    pub fn push(&mut self, item: T, priority: Priority, sequence: u64) {
        self.heap.push(PrioritizedItem { priority, sequence, item });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|p| p.item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|p| &p.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_then_sequence() {
        let mut queue = PriorityQueue::new();
        queue.push("n1", Priority::Normal, 1);
        queue.push("h2", Priority::High, 2);
        queue.push("l3", Priority::Low, 3);
        queue.push("h4", Priority::High, 4);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(order, vec!["h2", "h4", "n1", "l3"]);
    }

    #[test]
    fn immediate_beats_everything() {
        let mut queue = PriorityQueue::new();
        queue.push("h", Priority::High, 1);
        queue.push("i", Priority::Immediate, 9);
        assert_eq!(queue.peek(), Some(&"i"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn requeued_item_keeps_its_place() {
        let mut queue = PriorityQueue::new();
        queue.push("late", Priority::Normal, 7);
        queue.push("early", Priority::Normal, 3);
        assert_eq!(queue.pop(), Some("early"));
    }

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
