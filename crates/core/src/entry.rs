//! Context log domain types.
//!
//! A session's history is an ordered, append-only sequence of
//! [`ContextEntry`] records. Entries are never mutated or reordered once
//! appended; compaction replaces the whole log at a generation boundary
//! rather than editing it in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role an entry is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Engine-generated notes (summaries, observations, errors)
    System,
}

/// What kind of record an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Plain conversational text
    Text,
    /// An assistant request to invoke a tool
    ActionRequest,
    /// A condensed note about a tool's result
    Observation,
    /// A recoverable step failure, recorded for the model to see
    Error,
}

/// A single immutable record in the context log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Who this entry is attributed to
    pub role: Role,

    /// The kind of record
    pub kind: EntryKind,

    /// The text content
    pub content: String,

    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    fn new(role: Role, kind: EntryKind, content: impl Into<String>) -> Self {
        Self {
            role,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// A user text entry. The content is expected to already carry the
    /// author prefix (`"alice: hello"`), applied when the pending queue
    /// is drained.
    pub fn user_text(content: impl Into<String>) -> Self {
        Self::new(Role::User, EntryKind::Text, content)
    }

    /// An assistant text answer.
    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, EntryKind::Text, content)
    }

    /// An engine-generated system text entry (e.g. a compaction summary).
    pub fn system_text(content: impl Into<String>) -> Self {
        Self::new(Role::System, EntryKind::Text, content)
    }

    /// An assistant request to invoke a tool, rendered as `name(arguments)`.
    pub fn action_request(tool_name: &str, arguments: &serde_json::Value) -> Self {
        Self::new(
            Role::Assistant,
            EntryKind::ActionRequest,
            format!("{tool_name}({arguments})"),
        )
    }

    /// A condensed observation of a tool result.
    pub fn observation(content: impl Into<String>) -> Self {
        Self::new(Role::System, EntryKind::Observation, content)
    }

    /// A recoverable step failure, visible to the model on the next pass.
    pub fn error_note(content: impl Into<String>) -> Self {
        Self::new(Role::System, EntryKind::Error, content)
    }
}

/// The ordered, append-only history of one session generation.
///
/// Grows monotonically within a generation. The only way to "shrink" it is
/// to start a new generation seeded from a compacted replacement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextLog {
    entries: Vec<ContextEntry>,
}

impl ContextLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log seeded from a compacted replacement context.
    pub fn seeded_from(entries: Vec<ContextEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry. Entries cannot be removed or reordered.
    pub fn append(&mut self, entry: ContextEntry) {
        self.entries.push(entry);
    }

    /// All entries in append order.
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// The last `n` entries (fewer if the log is shorter).
    pub fn last_n(&self, n: usize) -> &[ContextEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_append_order() {
        let mut log = ContextLog::new();
        log.append(ContextEntry::user_text("alice: first"));
        log.append(ContextEntry::assistant_text("second"));
        log.append(ContextEntry::user_text("bob: third"));

        let contents: Vec<&str> = log.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["alice: first", "second", "bob: third"]);
    }

    #[test]
    fn last_n_returns_tail() {
        let mut log = ContextLog::new();
        for i in 0..5 {
            log.append(ContextEntry::user_text(format!("u: {i}")));
        }
        let tail = log.last_n(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "u: 3");
        assert_eq!(tail[1].content, "u: 4");

        // Asking for more than exists returns everything
        assert_eq!(log.last_n(100).len(), 5);
    }

    #[test]
    fn seeded_log_contains_replacement() {
        let summary = ContextEntry::system_text("Conversation summary: greeted");
        let log = ContextLog::seeded_from(vec![summary]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].role, Role::System);
        assert_eq!(log.entries()[0].kind, EntryKind::Text);
    }

    #[test]
    fn action_request_renders_name_and_args() {
        let entry =
            ContextEntry::action_request("calculator", &serde_json::json!({"expression": "2+2"}));
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.kind, EntryKind::ActionRequest);
        assert!(entry.content.starts_with("calculator("));
        assert!(entry.content.contains("2+2"));
    }

    #[test]
    fn entry_serialization_roundtrip() {
        let entry = ContextEntry::error_note("model call failed: timeout");
        let json = serde_json::to_string(&entry).unwrap();
        let back: ContextEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, EntryKind::Error);
        assert_eq!(back.content, entry.content);
    }
}
