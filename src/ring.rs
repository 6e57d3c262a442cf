//! Bounded single-producer/single-consumer ring with drop-oldest backpressure.
//!
//! The producer never blocks: pushing into a full ring evicts the oldest slot and counts
//! the eviction. The consumer either polls with [`RingBuffer::pop`] or suspends in
//! [`RingBuffer::pop_wait`] until a record arrives or the ring is closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

pub struct RingBuffer<T> {
    // Dropped on close, which disconnects the channel once the backlog is consumed
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
    evicted: AtomicU64,
}

impl<T> RingBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        RingBuffer {
            sender: Mutex::new(Some(sender)),
            receiver,
            evicted: AtomicU64::new(0),
        }
    }

    /// Appends `item`, evicting the oldest entry when full.
    ///
    /// Returns `false` only if the ring has been closed, in which case `item` is dropped.
    pub fn push(&self, item: T) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return false;
        };
        let mut item = item;
        loop {
            match sender.try_send(item) {
                Ok(()) => return true,
                Err(TrySendError::Full(rejected)) => {
                    // the consumer may have emptied a slot in between; only count real evictions
                    if self.receiver.try_recv().is_ok() {
                        self.evicted.fetch_add(1, Ordering::SeqCst);
                    }
                    item = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    /// Takes the oldest entry without waiting.
    pub fn pop(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Takes the oldest entry, suspending while the ring is empty.
    ///
    /// Returns `None` once the ring is closed and every remaining entry has been taken.
    pub fn pop_wait(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Like [`pop_wait`](Self::pop_wait) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Rejects further pushes and wakes a waiting consumer. Buffered entries stay poppable.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Entries evicted by drop-oldest since creation.
    pub fn dropped(&self) -> u64 {
        self.evicted.load(Ordering::SeqCst)
    }
}
