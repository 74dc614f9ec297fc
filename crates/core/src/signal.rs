//! Inbound session signals.
//!
//! A session is an actor: the only way in is its mailbox. Signals are
//! fire-and-forget and observed by the controller in delivery order, at
//! its well-defined wait points — never mid-step. Read-only queries ride
//! the same mailbox and answer over a oneshot channel, which keeps the
//! context log exclusively owned by the session task.

use tokio::sync::oneshot;

use crate::entry::ContextEntry;
use crate::pending::PendingMessage;

/// A fire-and-forget signal delivered to a session's mailbox.
pub enum SessionSignal {
    /// Enqueue a pending user message
    Deliver(PendingMessage),

    /// Request a cooperative exit (honored at the top of the loop)
    Exit,

    /// Request a checkpoint-and-restart at the next opportunity
    ForceCheckpoint,

    /// Switch the active model; takes effect on the next reasoning step
    SetModel(String),

    /// Set a session feature flag
    SetFlag { name: String, value: bool },

    /// A read-only query answered over a oneshot channel
    Query(SessionQuery),
}

/// Read-only, best-effort queries against the current generation.
pub enum SessionQuery {
    /// The last `limit` entries of the current context log
    RecentContext {
        limit: usize,
        reply: oneshot::Sender<Vec<ContextEntry>>,
    },

    /// The assistant text that answered a submitted message, if any yet.
    /// Best-effort correlation, not a delivery guarantee.
    ResponseFor {
        correlation_id: String,
        reply: oneshot::Sender<Option<String>>,
    },
}

impl std::fmt::Debug for SessionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deliver(m) => write!(f, "Deliver({})", m.correlation_id),
            Self::Exit => write!(f, "Exit"),
            Self::ForceCheckpoint => write!(f, "ForceCheckpoint"),
            Self::SetModel(m) => write!(f, "SetModel({m})"),
            Self::SetFlag { name, value } => write!(f, "SetFlag({name}={value})"),
            Self::Query(SessionQuery::RecentContext { limit, .. }) => {
                write!(f, "Query(RecentContext, limit={limit})")
            }
            Self::Query(SessionQuery::ResponseFor { correlation_id, .. }) => {
                write!(f, "Query(ResponseFor, {correlation_id})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_format_names_variants() {
        let sig = SessionSignal::SetFlag {
            name: "verbose".into(),
            value: true,
        };
        assert_eq!(format!("{sig:?}"), "SetFlag(verbose=true)");

        let (tx, _rx) = oneshot::channel();
        let sig = SessionSignal::Query(SessionQuery::RecentContext {
            limit: 5,
            reply: tx,
        });
        assert!(format!("{sig:?}").contains("RecentContext"));
    }
}
