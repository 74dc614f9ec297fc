//! `palaver run` — the daemon: all enabled channels routed through the
//! session manager.
//!
//! Session identifiers are `"{channel}:{chat_id}"`, so each chat gets its
//! own independent turn loop and responses route back to where the
//! conversation lives.

use std::sync::Arc;

use async_trait::async_trait;
use palaver_channels::{ChannelRegistry, CliChannel, WebhookChannel, WebhookConfig};
use palaver_config::AppConfig;
use palaver_core::{Channel, DeliverySink, EventBus, PendingMessage, Role, SessionPrefs, SinkError};
use palaver_session::SessionManager;
use tracing::{info, warn};

/// Routes assistant output back to the channel a session belongs to.
struct ChannelSink {
    registry: Arc<ChannelRegistry>,
}

#[async_trait]
impl DeliverySink for ChannelSink {
    async fn publish(&self, session_id: &str, _role: Role, text: &str) -> Result<(), SinkError> {
        let Some((channel, chat_id)) = session_id.split_once(':') else {
            return Err(SinkError(format!("Unroutable session id: {session_id}")));
        };
        self.registry
            .send_to(channel, chat_id, text)
            .await
            .map_err(|e| SinkError(e.to_string()))
    }
}

/// Build the channel registry from configuration.
fn build_channels(config: &AppConfig) -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();

    for (name, channel_config) in &config.channels {
        if !channel_config.enabled {
            continue;
        }
        match name.as_str() {
            "cli" => registry.register(Arc::new(CliChannel::new())),
            "webhook" => {
                let shared_secret = channel_config
                    .settings
                    .get("shared_secret")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                registry.register(Arc::new(WebhookChannel::new(WebhookConfig {
                    shared_secret,
                    allowed_senders: channel_config.allowed_users.clone(),
                })));
            }
            other => warn!(channel = %other, "Unknown channel in config, skipping"),
        }
    }

    registry
}

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let provider = super::build_provider(&config)?;
    let tools = Arc::new(palaver_tools::default_registry());
    let events = Arc::new(EventBus::default());

    let registry = Arc::new(build_channels(&config));
    if registry.is_empty() {
        anyhow::bail!("No channels enabled — add [channels.cli] enabled = true to the config");
    }

    let manager = SessionManager::new(
        provider,
        tools,
        Arc::new(ChannelSink {
            registry: registry.clone(),
        }),
        events,
        SessionPrefs::new(&config.default_model, config.default_temperature),
        super::session_config(&config),
    );

    let mut inbound = registry.start_all().await?;
    info!(channels = ?registry.list(), "Daemon started");

    loop {
        tokio::select! {
            maybe_msg = inbound.recv() => {
                let Some((channel_name, result)) = maybe_msg else {
                    info!("All channels closed, shutting down");
                    break;
                };
                match result {
                    Ok(msg) => {
                        let allowed = registry
                            .get(&channel_name)
                            .map(|c| c.is_allowed(&msg.sender_id))
                            .unwrap_or(false);
                        if !allowed {
                            warn!(
                                channel = %channel_name,
                                sender = %msg.sender_id,
                                "Dropping message from disallowed sender"
                            );
                            continue;
                        }

                        let session_id = format!("{}:{}", channel_name, msg.chat_id);
                        let handle = manager.handle_for(&session_id).await;
                        handle.deliver(PendingMessage::new(msg.author_label(), &msg.content));
                    }
                    Err(e) => warn!(channel = %channel_name, error = %e, "Channel error"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    manager.shutdown_all().await;
    registry.stop_all().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_config::ChannelConfig;

    #[test]
    fn disabled_channels_are_skipped() {
        let mut config = AppConfig::default();
        config.channels.insert(
            "cli".into(),
            ChannelConfig {
                enabled: false,
                allowed_users: vec![],
                settings: Default::default(),
            },
        );
        let registry = build_channels(&config);
        assert!(registry.is_empty());
    }

    #[test]
    fn enabled_channels_are_registered() {
        let mut config = AppConfig::default();
        config.channels.insert(
            "cli".into(),
            ChannelConfig {
                enabled: true,
                allowed_users: vec![],
                settings: Default::default(),
            },
        );
        let mut settings = std::collections::HashMap::new();
        settings.insert("shared_secret".into(), serde_json::json!("hunter2"));
        config.channels.insert(
            "webhook".into(),
            ChannelConfig {
                enabled: true,
                allowed_users: vec!["github".into()],
                settings,
            },
        );

        let registry = build_channels(&config);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("cli").is_some());
        assert!(registry.get("webhook").is_some());
    }
}
