//! Bounded relay queue between ingress and egress
//!
//! The producer never waits: when the queue is full the offered envelope is
//! handed back and counted as dropped. The consumer waits while the queue is
//! empty and sees `None` only once the queue is closed and fully drained.

use crate::error::RelayError;
use crate::proto::loggregator_v2::Envelope;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// FIFO queue of envelopes with a fixed capacity
///
/// Single consumer. Any number of producers may push concurrently.
pub struct RelayQueue<T = Envelope> {
    state: Mutex<State<T>>,
    capacity: usize,
    notify: Notify,
    counters: QueueCounters,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Lifetime counters for queue monitoring
#[derive(Default)]
pub struct QueueCounters {
    /// Items accepted
    pub pushed: AtomicU64,
    /// Items refused because the queue was full or closed
    pub dropped: AtomicU64,
    /// Items handed to the consumer
    pub drained: AtomicU64,
}

impl<T> RelayQueue<T> {
    /// Create an open queue holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            notify: Notify::new(),
            counters: QueueCounters::default(),
        }
    }

    /// Offer an item without waiting
    ///
    /// A full queue refuses the newest item; queued items are never evicted.
    pub fn try_push(&self, item: T) -> Result<(), RelayError<T>> {
        {
            let mut state = self.state.lock();
            if state.closed {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(RelayError::Closed(item));
            }
            if state.items.len() >= self.capacity {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(RelayError::Full(item));
            }
            state.items.push_back(item);
        }

        self.counters.pushed.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        Ok(())
    }

    /// Take the oldest item, waiting while the queue is empty
    ///
    /// Returns `None` once the queue is closed and nothing is left.
    pub async fn pop(&self) -> Option<T> {
        loop {
            // Register interest before checking so a push between the check
            // and the await is not missed.
            let notified = self.notify.notified();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    self.counters.drained.fetch_add(1, Ordering::Relaxed);
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take the oldest item if one is ready
    pub fn try_pop(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.counters.drained.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Refuse further pushes and wake the consumer. Idempotent.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
        // notify_waiters does not store a permit; cover a consumer that is
        // between its check and its await.
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Current number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items accepted
    pub fn total_pushed(&self) -> u64 {
        self.counters.pushed.load(Ordering::Relaxed)
    }

    /// Total items refused
    pub fn total_dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Total items handed out
    pub fn total_drained(&self) -> u64 {
        self.counters.drained.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_push_beyond_capacity_drops_newest() {
        let queue = RelayQueue::new(3);

        for i in 0..5u32 {
            let result = queue.try_push(i);
            if i < 3 {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(RelayError::Full(v)) if v == i));
            }
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.total_pushed(), 3);
        assert_eq!(queue.total_dropped(), 2);

        // Oldest items survive
        assert_eq!(queue.try_pop(), Some(0));
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), None);
    }

    #[tokio::test]
    async fn test_pop_is_fifo() {
        let queue = RelayQueue::new(10);
        for i in 0..4u32 {
            queue.try_push(i).unwrap();
        }

        for i in 0..4u32 {
            assert_eq!(queue.pop().await, Some(i));
        }
        assert_eq!(queue.total_drained(), 4);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(RelayQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.try_push("hello").unwrap();
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped, Some("hello"));
    }

    #[tokio::test]
    async fn test_close_drains_remaining_then_ends() {
        let queue = RelayQueue::new(4);
        queue.try_push(1u8).unwrap();
        queue.try_push(2u8).unwrap();
        queue.close();

        assert!(matches!(queue.try_push(3u8), Err(RelayError::Closed(3))));
        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, None);
        assert_eq!(queue.total_dropped(), 1);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue = Arc::new(RelayQueue::<u32>::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        queue.close();

        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped, None);
        assert!(queue.is_closed());
    }
}
