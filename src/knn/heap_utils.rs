//! This module contains the bounded candidate heap used by the k-NN search.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, TryReserveError};
use ordered_float::OrderedFloat; // For using f32 in BinaryHeap

/// A candidate neighbor: a sample id and its distance to the query.
///
/// Ordered by distance, then by sample id, so that equal distances resolve
/// deterministically in favour of the smaller id.
#[derive(Debug, Clone, Copy)]
pub struct HeapElement {
    pub distance: OrderedFloat<f32>,
    pub id: usize,
}

impl PartialEq for HeapElement {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapElement {}

impl PartialOrd for HeapElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapElement {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so the worst retained candidate sits on top.
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Keeps the `capacity` best (smallest distance) candidates seen so far.
#[derive(Debug)]
pub struct KBestNeighbors {
    capacity: usize,
    heap: BinaryHeap<HeapElement>,
}

impl KBestNeighbors {
    pub fn new(capacity: usize) -> Result<Self, TryReserveError> {
        let mut heap = BinaryHeap::new();
        heap.try_reserve_exact(capacity)?;
        Ok(KBestNeighbors { capacity, heap })
    }

    /// Offers a candidate. Returns `true` if it was retained.
    pub fn add(&mut self, distance: f32, id: usize) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let item = HeapElement { distance: OrderedFloat(distance), id };
        if self.heap.len() < self.capacity {
            self.heap.push(item);
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut worst) if item < *worst => {
                *worst = item;
                true
            }
            _ => false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() == self.capacity
    }

    /// Distance of the worst retained candidate once the heap is full.
    /// `None` while it is still filling, i.e. an unbounded search radius.
    pub fn current_farthest_distance(&self) -> Option<f32> {
        if self.is_full() {
            self.heap.peek().map(|heap_elem| heap_elem.distance.0)
        } else {
            None
        }
    }

    /// Whether a subtree whose points are all at least `bound` away may still
    /// hold a candidate that would be retained.
    ///
    /// Equality is not pruned: a point at exactly the worst distance can still
    /// displace the top if its id is smaller.
    pub fn may_contain_better(&self, bound: f32) -> bool {
        self.current_farthest_distance()
            .is_none_or(|radius| bound <= radius)
    }

    /// Drains the heap into ascending `(distance, id)` order.
    pub fn into_sorted_vec(self) -> Vec<HeapElement> {
        self.heap.into_sorted_vec()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
