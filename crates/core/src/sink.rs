//! Delivery sink — the outbound side-channel for assistant output.
//!
//! The session engine publishes every assistant text here so platform
//! adapters can render it back out (and persistence layers can record it).
//! Publication is best-effort: failures are logged by the caller and never
//! propagated into the context log.

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::Role;

/// A delivery sink failure. Never escalated beyond a log line.
#[derive(Debug, Error)]
#[error("Delivery sink error: {0}")]
pub struct SinkError(pub String);

/// Best-effort publication of session output.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Publish a piece of session output attributed to `role`.
    async fn publish(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
    ) -> std::result::Result<(), SinkError>;
}

/// A sink that drops everything. Useful for tests and headless runs.
pub struct NullSink;

#[async_trait]
impl DeliverySink for NullSink {
    async fn publish(
        &self,
        _session_id: &str,
        _role: Role,
        _text: &str,
    ) -> std::result::Result<(), SinkError> {
        Ok(())
    }
}
