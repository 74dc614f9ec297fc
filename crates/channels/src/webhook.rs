//! Webhook channel adapter.
//!
//! Accepts inbound webhook deliveries from arbitrary systems. The HTTP
//! listener itself lives with whoever hosts it; this adapter owns payload
//! parsing, HMAC signature validation, and the channel plumbing — the
//! host hands raw bodies to [`WebhookChannel::inject`].

use async_trait::async_trait;
use chrono::Utc;
use palaver_core::channel::{Channel, ChannelId, ChannelMessage};
use palaver_core::error::ChannelError;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;

/// Webhook channel configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// HMAC shared secret for signature validation. None = no validation.
    pub shared_secret: Option<String>,
    /// Allowed sender identifiers. Empty = deny all, ["*"] = allow all.
    pub allowed_senders: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            shared_secret: None,
            allowed_senders: vec!["*".into()],
        }
    }
}

/// The JSON body a webhook delivery carries.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    sender: String,
    #[serde(default)]
    sender_name: Option<String>,
    text: String,
    #[serde(default)]
    chat_id: Option<String>,
}

/// Webhook channel adapter.
pub struct WebhookChannel {
    config: WebhookConfig,
    channel_id: ChannelId,
    inject_tx: tokio::sync::Mutex<Option<mpsc::Sender<Result<ChannelMessage, ChannelError>>>>,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            channel_id: ChannelId("webhook".into()),
            inject_tx: tokio::sync::Mutex::new(None),
        }
    }

    /// Handle a raw webhook delivery: verify the signature, parse the
    /// payload, check the allowlist, and feed the message inbound.
    pub async fn inject(&self, body: &[u8], signature: Option<&str>) -> Result<(), ChannelError> {
        if !self.verify_signature(body, signature) {
            return Err(ChannelError::SignatureMismatch);
        }

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        if !self.is_allowed(&payload.sender) {
            return Err(ChannelError::Unauthorized {
                channel: "webhook".into(),
                sender_id: payload.sender,
            });
        }

        let msg = ChannelMessage {
            channel_id: self.channel_id.clone(),
            chat_id: payload
                .chat_id
                .unwrap_or_else(|| format!("webhook:{}", payload.sender)),
            sender_id: payload.sender,
            sender_name: payload.sender_name,
            content: payload.text,
            timestamp: Utc::now(),
        };

        let guard = self.inject_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => tx
                .send(Ok(msg))
                .await
                .map_err(|_| ChannelError::ConnectionLost("Message channel closed".into())),
            None => Err(ChannelError::ConnectionLost(
                "Webhook channel not started".into(),
            )),
        }
    }

    /// Validate an HMAC-SHA256 signature against the shared secret.
    ///
    /// The expected format is a hex-encoded digest, optionally prefixed
    /// with `sha256=`. Uses constant-time comparison.
    pub fn verify_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let Some(secret) = self.config.shared_secret.as_deref() else {
            return true; // No secret configured = no validation
        };
        if secret.is_empty() {
            return true;
        }

        let Some(signature) = signature else {
            return false; // Secret configured but no signature provided
        };
        let sig_hex = signature.strip_prefix("sha256=").unwrap_or(signature);

        let provided_bytes = match hex::decode(sig_hex) {
            Ok(b) => b,
            Err(_) => return false, // Invalid hex = reject
        };

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(payload);
        mac.verify_slice(&provided_bytes).is_ok()
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        info!("Webhook channel starting");
        let (tx, rx) = mpsc::channel(64);
        *self.inject_tx.lock().await = Some(tx);
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, content: &str) -> Result<(), ChannelError> {
        // Webhook deliveries are one-way; responses are retrieved via the
        // read-only session queries.
        info!(
            chat_id = %chat_id,
            content_len = content.len(),
            "Webhook response available for polling"
        );
        Ok(())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        if self.config.allowed_senders.is_empty() {
            return false;
        }
        if self.config.allowed_senders.iter().any(|s| s == "*") {
            return true;
        }
        self.config.allowed_senders.iter().any(|s| s == sender_id)
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        Ok(true) // Webhook is always ready (stateless)
    }
}
