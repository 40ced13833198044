//! Bounded drop-oldest event queue between `emit` and the sender task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::event::LogEvent;

#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<LogEvent>>,
    capacity: usize,
    dropped: AtomicU64,
    ready: Notify,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            dropped: AtomicU64::new(0),
            ready: Notify::new(),
        }
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<LogEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without waiting. Returns `false` if the oldest event was dropped.
    pub fn push(&self, event: LogEvent) -> bool {
        let evicted = {
            let mut events = self.events();
            let evicted = if events.len() >= self.capacity {
                events.pop_front().is_some()
            } else {
                false
            };
            events.push_back(event);
            evicted
        };
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
        !evicted
    }

    /// Take up to `max` events, oldest first.
    pub fn take(&self, max: usize) -> Vec<LogEvent> {
        let mut events = self.events();
        let n = events.len().min(max);
        events.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolves after the next push (or immediately if one was missed).
    pub fn ready(&self) -> Notified<'_> {
        self.ready.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;

    fn event(i: usize) -> LogEvent {
        LogEvent::new(Level::Info, "svc", format!("e{i}"))
    }

    #[test]
    fn bounded_with_drop_oldest() {
        let queue = EventQueue::new(100);
        for i in 0..1000 {
            queue.push(event(i));
        }
        assert_eq!(queue.len(), 100);
        assert_eq!(queue.dropped(), 900);

        let first = queue.take(1);
        assert_eq!(first[0].message, "e900");
    }

    #[test]
    fn take_preserves_fifo() {
        let queue = EventQueue::new(10);
        for i in 0..5 {
            assert!(queue.push(event(i)));
        }
        let batch: Vec<String> = queue.take(3).into_iter().map(|e| e.message).collect();
        assert_eq!(batch, ["e0", "e1", "e2"]);
        assert_eq!(queue.len(), 2);
        assert!(queue.take(0).is_empty());
    }

    #[tokio::test]
    async fn push_wakes_waiter() {
        let queue = std::sync::Arc::new(EventQueue::new(4));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.ready().await })
        };
        tokio::task::yield_now().await;
        queue.push(event(0));
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
