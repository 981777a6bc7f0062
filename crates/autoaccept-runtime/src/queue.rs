//! Unbounded multi-consumer FIFO queue.
//!
//! Producers never wait. Consumers take turns on the receiver, so each item
//! is handed to exactly one worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};

/// FIFO queue shared between a producer side and a pool of workers.
pub struct WorkQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
    depth: AtomicUsize,
}

impl<T: Send> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> WorkQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    /// Append an item at the tail. Never blocks.
    pub fn push(&self, item: T) {
        self.depth.fetch_add(1, Ordering::AcqRel);
        // The receiver lives as long as `self`, so the channel cannot be closed here.
        if self.tx.send(item).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Wait for the next item at the head.
    ///
    /// Returns `None` only if the channel was closed, which cannot happen
    /// while the queue is alive.
    pub async fn pop(&self) -> Option<T> {
        let item = self.rx.lock().await.recv().await;
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        item
    }

    /// Items waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Whether no items are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
