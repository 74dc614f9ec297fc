//! Pending message queue.
//!
//! Buffers inbound user messages until the turn loop is ready to consume
//! them. Enqueue is side-effect only — it never blocks and never fails.
//! Draining removes and returns everything at once, in arrival order; a
//! message can never be drained twice, and nothing enqueued is ever
//! silently lost.

use std::collections::VecDeque;

use palaver_core::PendingMessage;

/// An in-memory FIFO of messages awaiting the next turn.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<PendingMessage>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the queue from messages carried across a checkpoint.
    /// They keep their original arrival order.
    pub fn reseed(pending: Vec<PendingMessage>) -> Self {
        Self {
            items: pending.into(),
        }
    }

    /// Append a message. Never blocks, never fails.
    pub fn enqueue(&mut self, message: PendingMessage) {
        self.items.push_back(message);
    }

    /// Atomically remove and return all queued messages in arrival order.
    pub fn drain_all(&mut self) -> Vec<PendingMessage> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
