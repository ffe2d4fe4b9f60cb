//! Bounded drop-oldest queue shared by the ingestion and synthesis stages.
//!
//! Producers never block: when the queue is full the oldest item is evicted
//! and handed back to the caller so it can be counted and logged. The single
//! consumer suspends in [`DropOldestQueue::pop`] until an item arrives or the
//! queue is shut down. Shutdown acts as the sentinel: items already queued
//! are still delivered, then `pop` returns `None`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// Result of a non-blocking push.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// Item was queued without eviction.
    Accepted,
    /// Item was queued after evicting the returned oldest item.
    Evicted(T),
    /// Queue is shut down; the item was not queued.
    Closed(T),
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity FIFO that drops the oldest item on overflow.
pub struct DropOldestQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> DropOldestQueue<T> {
    /// Creates a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    // A panic while holding the lock leaves the deque itself consistent.
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues an item without blocking.
    pub fn push(&self, item: T) -> PushOutcome<T> {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return PushOutcome::Closed(item);
            }
            let evicted = if inner.items.len() >= self.capacity {
                inner.items.pop_front()
            } else {
                None
            };
            inner.items.push_back(item);
            match evicted {
                Some(old) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    PushOutcome::Evicted(old)
                }
                None => PushOutcome::Accepted,
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Waits for the next item. Returns `None` once the queue is shut down
    /// and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Returns the next item if one is queued.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Marks the queue closed and wakes the consumer. Idempotent.
    pub fn shutdown(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Removes every queued item, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let count = inner.items.len();
        inner.items.clear();
        count
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
