//! Chat channel implementations for Palaver.
//!
//! Channels are the platform adapters: they translate a native protocol
//! (a terminal, an HTTP webhook) into inbound [`ChannelMessage`]s and
//! render assistant text back out. The registry merges every enabled
//! channel into one inbound stream for the daemon loop.
//!
//! [`ChannelMessage`]: palaver_core::ChannelMessage

pub mod cli;
pub mod registry;
pub mod webhook;

pub use cli::CliChannel;
pub use registry::ChannelRegistry;
pub use webhook::{WebhookChannel, WebhookConfig};
