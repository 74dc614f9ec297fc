//! Pending messages, checkpoints, and session preferences.
//!
//! These are the value objects that cross a generation boundary: whatever
//! is still pending when a session checkpoints must reappear, untouched,
//! at the head of the next generation's queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::entry::ContextEntry;

/// An inbound user message waiting to be consumed by the turn loop.
///
/// Correlation ids are caller-supplied so an external sender can poll for
/// the eventual response. The queue does not deduplicate on them: a
/// retried signal is appended (and answered) twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    /// Caller-supplied (or generated) id for response correlation
    pub correlation_id: String,

    /// Author label, prefixed onto the text when drained into the log
    pub author: String,

    /// Raw message text
    pub text: String,

    /// Arrival timestamp
    pub arrived_at: DateTime<Utc>,
}

impl PendingMessage {
    /// Create a message with a freshly generated correlation id.
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_correlation_id(Uuid::new_v4().to_string(), author, text)
    }

    /// Create a message with a caller-supplied correlation id.
    pub fn with_correlation_id(
        correlation_id: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            author: author.into(),
            text: text.into(),
            arrived_at: Utc::now(),
        }
    }

    /// The text as it appears in the context log: `"author: text"`.
    pub fn attributed_text(&self) -> String {
        format!("{}: {}", self.author, self.text)
    }
}

/// A generation boundary snapshot.
///
/// Carries everything the next generation needs: the compacted context
/// (empty on first run), the untouched pending queue, and the exit flag.
/// No pending message present at a boundary may be dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Compacted replacement context that seeds the next generation's log
    pub compacted: Vec<ContextEntry>,

    /// Messages still pending at the moment of restart, in arrival order
    pub pending: Vec<PendingMessage>,

    /// Whether an exit was requested before the boundary
    pub exit_requested: bool,

    /// The generation this checkpoint starts
    pub generation: u64,
}

impl Checkpoint {
    /// The checkpoint a brand-new session starts from: nothing compacted,
    /// nothing pending, generation zero.
    pub fn initial() -> Self {
        Self {
            compacted: Vec::new(),
            pending: Vec::new(),
            exit_requested: false,
            generation: 0,
        }
    }
}

/// Mutable per-session preferences.
///
/// Updated by inbound signals; take effect on the next reasoning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPrefs {
    /// Active model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Free-form feature flags
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl SessionPrefs {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
            flags: BTreeMap::new(),
        }
    }

    /// Whether a flag is set (unset flags read as false).
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributed_text_carries_author_prefix() {
        let msg = PendingMessage::new("alice", "What's 2+2?");
        assert_eq!(msg.attributed_text(), "alice: What's 2+2?");
    }

    #[test]
    fn generated_correlation_ids_are_unique() {
        let a = PendingMessage::new("alice", "hi");
        let b = PendingMessage::new("alice", "hi");
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn caller_supplied_id_is_kept_verbatim() {
        let msg = PendingMessage::with_correlation_id("req-42", "bob", "hello");
        assert_eq!(msg.correlation_id, "req-42");
    }

    #[test]
    fn initial_checkpoint_is_empty() {
        let cp = Checkpoint::initial();
        assert!(cp.compacted.is_empty());
        assert!(cp.pending.is_empty());
        assert!(!cp.exit_requested);
        assert_eq!(cp.generation, 0);
    }

    #[test]
    fn prefs_flags_default_to_false() {
        let mut prefs = SessionPrefs::new("gpt-4o", 0.7);
        assert!(!prefs.flag("verbose"));
        prefs.flags.insert("verbose".into(), true);
        assert!(prefs.flag("verbose"));
    }
}
