//! Fixed-capacity drop-oldest ring buffer.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T: Clone> RingBuffer<T> {
    /// `capacity` is clamped to at least one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1 << 16)),
            capacity,
            evicted: 0,
        }
    }

    /// Append, returning the evicted item when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.evicted += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total evictions since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_full() {
        let mut ring = RingBuffer::new(3);
        for i in 0..3 {
            assert_eq!(ring.push(i), None);
        }
        assert_eq!(ring.evicted(), 0);

        for i in 3..10 {
            let before = ring.evicted();
            assert_eq!(ring.push(i), Some(i - 3));
            assert_eq!(ring.evicted(), before + 1);
            assert_eq!(ring.len(), 3);
        }
        assert_eq!(ring.snapshot(), vec![7, 8, 9]);
        assert_eq!(ring.iter().rev().next(), Some(&9));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut ring = RingBuffer::new(0);
        ring.push("a");
        assert_eq!(ring.push("b"), Some("a"));
        assert_eq!(ring.capacity(), 1);
    }
}
