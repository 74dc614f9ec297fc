//! `palaver chat` — interactive terminal chat or single-message mode.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use palaver_channels::CliChannel;
use palaver_config::AppConfig;
use palaver_core::{Channel, DeliverySink, EventBus, Role, SessionPrefs, SinkError};
use palaver_session::spawn_session;
use tracing::warn;

/// Prints assistant output to the terminal.
struct TerminalSink;

#[async_trait]
impl DeliverySink for TerminalSink {
    async fn publish(
        &self,
        _session_id: &str,
        _role: Role,
        text: &str,
    ) -> Result<(), SinkError> {
        println!("palaver> {text}");
        Ok(())
    }
}

pub async fn run(message: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let provider = super::build_provider(&config)?;
    let tools = Arc::new(palaver_tools::default_registry());
    let events = Arc::new(EventBus::default());
    let prefs = SessionPrefs::new(&config.default_model, config.default_temperature);

    let (handle, join) = spawn_session(
        "cli_session",
        provider,
        tools,
        Arc::new(TerminalSink),
        events,
        prefs,
        super::session_config(&config),
    );

    if let Some(text) = message {
        // Single-message mode: deliver, wait for the answer, exit.
        let correlation_id = handle.deliver_message("local_user", &text);
        let deadline = std::time::Instant::now() + Duration::from_secs(300);
        while handle.response_for(&correlation_id).await.is_none() {
            if std::time::Instant::now() > deadline {
                warn!("Timed out waiting for a response");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        handle.request_exit();
        join.await?.context("session failed")?;
        return Ok(());
    }

    // Interactive mode: feed stdin lines into the session until EOF or
    // an exit command ends the channel stream.
    println!("palaver — type a message, 'exit' to quit");
    let channel = CliChannel::new();
    let mut inbound = channel.start().await?;

    while let Some(result) = inbound.recv().await {
        match result {
            Ok(msg) => {
                handle.deliver_message(msg.author_label(), &msg.content);
            }
            Err(e) => {
                warn!(error = %e, "CLI channel error");
                break;
            }
        }
    }

    handle.request_exit();
    join.await?.context("session failed")?;
    Ok(())
}
