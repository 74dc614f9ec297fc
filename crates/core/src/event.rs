//! Domain event system — decoupled observation of session activity.
//!
//! The session engine publishes events as it works. Other components can
//! subscribe to react without tight coupling; publishing with no
//! subscribers is fine and loses nothing the engine cares about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An inbound message was enqueued on a session
    MessageQueued {
        session_id: String,
        correlation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn completed with an assistant text outcome
    TurnCompleted {
        session_id: String,
        generation: u64,
        tool_rounds: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        session_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A recoverable step failure was recorded in the context log
    StepFailed {
        session_id: String,
        step: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A generation ended with a checkpoint
    CheckpointTaken {
        session_id: String,
        generation: u64,
        entries_compacted: usize,
        pending_carried: usize,
        timestamp: DateTime<Utc>,
    },

    /// A session exited cleanly
    SessionExited {
        session_id: String,
        generation: u64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Slow
/// subscribers lag and drop; the publisher never blocks.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
