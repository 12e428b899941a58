//! FIFO with single-level front re-insertion.
//!
//! Producers append at the back. A consumer that fails to deliver an item
//! puts it back at the front, so it is the next item handed out, ahead of
//! everything that arrived in the meantime. There is no aging: an item that
//! keeps failing keeps winning the front slot.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// Returned by an enqueue on a full bounded queue; hands the item back.
pub struct QueueFull<T> {
    pub item: T,
    pub capacity: usize,
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFull")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full (capacity {})", self.capacity)
    }
}

impl<T> std::error::Error for QueueFull<T> {}

struct Slots<T> {
    items: VecDeque<T>,
    /// Back slots promised to outstanding [`Reservation`]s.
    reserved: usize,
}

impl<T> Slots<T> {
    fn has_room(&self, capacity: Option<usize>) -> bool {
        capacity.map_or(true, |capacity| self.items.len() + self.reserved < capacity)
    }
}

pub struct PriorityReentryQueue<T> {
    slots: Mutex<Slots<T>>,
    capacity: Option<usize>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> Default for PriorityReentryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityReentryQueue<T> {
    /// Unbounded queue; `enqueue` never fails.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Queue holding at most `capacity` items appended at the back.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            slots: Mutex::new(Slots {
                items: VecDeque::new(),
                reserved: 0,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Add an item without blocking.
    ///
    /// `at_front` puts the item ahead of everything pending. Front inserts
    /// ignore the capacity: they reinstate an item that was already taken
    /// out and must not be lost.
    pub fn enqueue(&self, item: T, at_front: bool) -> Result<(), QueueFull<T>> {
        {
            let mut slots = self.lock();
            if at_front {
                slots.items.push_front(item);
            } else {
                if !slots.has_room(self.capacity) {
                    let capacity = self.capacity.unwrap_or_default();
                    return Err(QueueFull { item, capacity });
                }
                slots.items.push_back(item);
            }
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append an item, waiting up to `wait` for space in a bounded queue.
    pub async fn enqueue_timeout(&self, item: T, wait: Duration) -> Result<(), QueueFull<T>> {
        let deadline = Instant::now() + wait;
        let mut item = item;
        loop {
            match self.enqueue(item, false) {
                Ok(()) => return Ok(()),
                Err(full) => item = full.item,
            }
            if timeout_at(deadline, self.not_full.notified()).await.is_err() {
                return self.enqueue(item, false);
            }
        }
    }

    /// Take the head item if there is one.
    pub fn try_dequeue(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Take the head item, waiting up to `wait` for one to arrive.
    ///
    /// `None` means the wait timed out; the queue stays usable and callers
    /// simply poll again.
    pub async fn dequeue(&self, wait: Duration) -> Option<T> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }
            if timeout_at(deadline, self.not_empty.notified()).await.is_err() {
                return self.try_dequeue();
            }
        }
    }

    /// Claim one back slot before the item exists.
    ///
    /// Lets a producer run side effects for an item only once it is certain
    /// the item will be accepted. The slot counts against the capacity until
    /// the reservation is used or dropped.
    pub fn reserve(&self, item: T) -> Result<Reservation<'_, T>, QueueFull<T>> {
        let mut slots = self.lock();
        if !slots.has_room(self.capacity) {
            let capacity = self.capacity.unwrap_or_default();
            return Err(QueueFull { item, capacity });
        }
        slots.reserved += 1;
        Ok(Reservation {
            queue: self,
            item: Some(item),
        })
    }

    fn release(&self) {
        {
            let mut slots = self.lock();
            slots.reserved = slots.reserved.saturating_sub(1);
        }
        self.not_full.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        // Every critical section is a single push, pop or counter update, so
        // a panic while holding the lock cannot leave the slots half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A back slot held for one item. Dropping it unused gives the slot back.
pub struct Reservation<'a, T> {
    queue: &'a PriorityReentryQueue<T>,
    item: Option<T>,
}

impl<T> Reservation<'_, T> {
    /// The item, for last changes before it becomes visible to consumers.
    pub fn item_mut(&mut self) -> Option<&mut T> {
        self.item.as_mut()
    }

    /// Append the item at the back, behind everything already queued.
    pub fn commit(mut self) {
        if let Some(item) = self.item.take() {
            {
                let mut slots = self.queue.lock();
                slots.reserved = slots.reserved.saturating_sub(1);
                slots.items.push_back(item);
            }
            self.queue.not_empty.notify_one();
        }
    }
}

impl<T> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.item.take().is_some() {
            self.queue.release();
        }
    }
}

impl<T: Clone> PriorityReentryQueue<T> {
    /// Pending items in dequeue order.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.iter().cloned().collect()
    }
}
