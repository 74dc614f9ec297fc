//! # Palaver Core
//!
//! Domain types, traits, and error definitions for the Palaver
//! conversational assistant. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the session engine talks to is defined as a trait
//! here (provider, tool, delivery sink, token estimator, channel).
//! Implementations live in their respective crates and are handed to the
//! engine as constructor parameters. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod channel;
pub mod entry;
pub mod error;
pub mod estimator;
pub mod event;
pub mod pending;
pub mod provider;
pub mod signal;
pub mod sink;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{Channel, ChannelId, ChannelMessage};
pub use entry::{ContextEntry, ContextLog, EntryKind, Role};
pub use error::{ChannelError, Error, ProviderError, Result, SessionError, ToolError};
pub use estimator::TokenEstimator;
pub use event::{DomainEvent, EventBus};
pub use pending::{Checkpoint, PendingMessage, SessionPrefs};
pub use provider::{
    Provider, ProviderRequest, ProviderResponse, ToolCallRequest, ToolDefinition, Usage,
};
pub use signal::{SessionQuery, SessionSignal};
pub use sink::{DeliverySink, NullSink, SinkError};
pub use tool::{Tool, ToolRegistry};
