//! Bounded prefetch queue between the producer tasks and the render loop.
//!
//! Producers push asynchronously and wait for a free slot when the queue is
//! full. The render thread never blocks for longer than the wait it asks for.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default number of items prepared ahead.
pub const DEFAULT_CAPACITY: usize = 5;
/// Items that must be ready before playback starts.
pub const DEFAULT_MIN_READY: usize = 3;

/// Returned by [`PrefetchQueue::push`] once the queue has been closed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("prefetch queue closed")]
pub struct QueueClosed;

pub struct PrefetchQueue<T> {
    items: Mutex<VecDeque<T>>,
    /// Signalled on every push and on close.
    pushed: Condvar,
    /// One permit per free slot.
    slots: Semaphore,
    capacity: usize,
    closed: AtomicBool,
}

impl<T> PrefetchQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            pushed: Condvar::new(),
            slots: Semaphore::new(capacity),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panicking holder cannot leave the deque half-updated.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item, waiting for a free slot while the queue is full.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        let permit = self.slots.acquire().await.map_err(|_| QueueClosed)?;
        if self.is_closed() {
            return Err(QueueClosed);
        }
        permit.forget();

        self.lock().push_back(item);
        self.pushed.notify_all();
        Ok(())
    }

    /// Take the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.pop_front(Duration::ZERO)
    }

    /// Take the two oldest items at once, if both are there.
    pub fn try_pop_two(&self) -> Option<(T, T)> {
        let mut items = self.lock();
        if items.len() < 2 {
            return None;
        }
        let first = items.pop_front()?;
        let second = items.pop_front()?;
        drop(items);
        self.slots.add_permits(2);
        Some((first, second))
    }

    /// Take the oldest item, waiting at most `wait` for one to arrive.
    pub fn pop_front(&self, wait: Duration) -> Option<T> {
        let items = self.lock();
        let (mut items, _) = self
            .pushed
            .wait_timeout_while(items, wait, |items| items.is_empty() && !self.is_closed())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let item = items.pop_front()?;
        drop(items);
        self.slots.add_permits(1);
        Some(item)
    }

    pub fn ready_count(&self) -> usize {
        self.lock().len()
    }

    /// Wait at most `wait` for `min_ready` items; returns the count reached.
    pub fn wait_ready(&self, min_ready: usize, wait: Duration) -> usize {
        let items = self.lock();
        let (items, _) = self
            .pushed
            .wait_timeout_while(items, wait, |items| {
                items.len() < min_ready && !self.is_closed()
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        items.len()
    }

    /// Stop accepting items and wake every waiter. Queued items are kept.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.slots.close();
        let _guard = self.lock();
        self.pushed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
