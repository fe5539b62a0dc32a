// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Priority queue shared by the client dispatcher and the job processor.
//!
//! Items dequeue highest priority first. Items of equal priority dequeue in
//! the order they were enqueued. The queue does no I/O and holds no locks;
//! callers wrap it in whatever synchronization they already use.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use genshield_core::Priority;
use serde::Serialize;

struct Slot<T> {
    priority: Priority,
    seq: Reverse<u64>,
    item: T,
}

impl<T> Slot<T> {
    fn key(&self) -> (u32, Reverse<u64>) {
        (self.priority.weight(), self.seq)
    }
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Queue depth broken down by tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub low: usize,
    pub normal: usize,
    pub high: usize,
    pub premium: usize,
}

impl QueueDepth {
    pub fn total(&self) -> usize {
        self.low + self.normal + self.high + self.premium
    }

    fn slot(&mut self, priority: Priority) -> &mut usize {
        match priority {
            Priority::Low => &mut self.low,
            Priority::Normal => &mut self.normal,
            Priority::High => &mut self.high,
            Priority::Premium => &mut self.premium,
        }
    }
}

/// Priority-first, arrival-order-second container.
pub struct PriorityQueue<T> {
    heap: BinaryHeap<Slot<T>>,
    next_seq: u64,
    depth: QueueDepth,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            depth: QueueDepth::default(),
        }
    }

    pub fn enqueue(&mut self, item: T, priority: Priority) {
        let seq = self.next_seq;
        self.next_seq += 1;
        *self.depth.slot(priority) += 1;
        self.heap.push(Slot {
            priority,
            seq: Reverse(seq),
            item,
        });
    }

    /// Remove the highest-priority, earliest item.
    pub fn dequeue(&mut self) -> Option<T> {
        self.dequeue_with_priority().map(|(item, _)| item)
    }

    pub fn dequeue_with_priority(&mut self) -> Option<(T, Priority)> {
        let slot = self.heap.pop()?;
        *self.depth.slot(slot.priority) -= 1;
        Some((slot.item, slot.priority))
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|slot| &slot.item)
    }

    pub fn peek_priority(&self) -> Option<Priority> {
        self.heap.peek().map(|slot| slot.priority)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn depth(&self) -> QueueDepth {
        self.depth
    }

    /// Items in dequeue order, without removing them.
    pub fn iter_ordered(&self) -> Vec<&T> {
        let mut slots: Vec<&Slot<T>> = self.heap.iter().collect();
        slots.sort_by(|a, b| b.cmp(a));
        slots.into_iter().map(|slot| &slot.item).collect()
    }

    /// Remove every item matching `pred`, keeping the order of the rest.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        let mut kept = BinaryHeap::with_capacity(self.heap.len());
        for slot in self.heap.drain() {
            if pred(&slot.item) {
                *self.depth.slot(slot.priority) -= 1;
                removed.push(slot.item);
            } else {
                kept.push(slot);
            }
        }
        self.heap = kept;
        removed
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.depth = QueueDepth::default();
    }
}

impl<T> std::fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.heap.len())
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_dequeues_none() {
        let mut q: PriorityQueue<u32> = PriorityQueue::new();
        assert!(q.dequeue().is_none());
        assert!(q.peek().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn higher_priority_first() {
        let mut q = PriorityQueue::new();
        q.enqueue("low", Priority::Low);
        q.enqueue("premium", Priority::Premium);
        q.enqueue("normal", Priority::Normal);
        q.enqueue("high", Priority::High);
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue()).collect();
        assert_eq!(order, vec!["premium", "high", "normal", "low"]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut q = PriorityQueue::new();
        for i in 0..5 {
            q.enqueue(i, Priority::Normal);
        }
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn depth_tracks_tiers() {
        let mut q = PriorityQueue::new();
        q.enqueue(1, Priority::High);
        q.enqueue(2, Priority::High);
        q.enqueue(3, Priority::Low);
        assert_eq!(q.depth().high, 2);
        assert_eq!(q.depth().low, 1);
        assert_eq!(q.depth().total(), 3);
        q.dequeue();
        assert_eq!(q.depth().high, 1);
    }

    #[test]
    fn iter_ordered_matches_dequeue_order() {
        let mut q = PriorityQueue::new();
        q.enqueue('a', Priority::Normal);
        q.enqueue('b', Priority::Premium);
        q.enqueue('c', Priority::Normal);
        let snapshot: Vec<char> = q.iter_ordered().into_iter().copied().collect();
        assert_eq!(snapshot, vec!['b', 'a', 'c']);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn remove_where_keeps_remaining_order() {
        let mut q = PriorityQueue::new();
        for i in 0..6 {
            q.enqueue(i, Priority::Normal);
        }
        let removed = q.remove_where(|i| i % 2 == 0);
        assert_eq!(removed.len(), 3);
        let rest: Vec<_> = std::iter::from_fn(|| q.dequeue()).collect();
        assert_eq!(rest, vec![1, 3, 5]);
        assert_eq!(q.depth().total(), 0);
    }
}
