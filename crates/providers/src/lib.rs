//! LLM provider implementations for Palaver.
//!
//! All providers implement the `palaver_core::Provider` trait. The vast
//! majority of backends speak the OpenAI chat-completions dialect, so a
//! single client with per-vendor constructors covers them.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
