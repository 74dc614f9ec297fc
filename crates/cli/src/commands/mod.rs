//! Command implementations and shared wiring.

pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod run;

use std::sync::Arc;

use anyhow::{Context, bail};
use palaver_config::AppConfig;
use palaver_core::Provider;
use palaver_providers::OpenAiCompatProvider;
use palaver_session::SessionConfig;

/// Build the configured provider.
pub fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let name = config.default_provider.as_str();
    let overrides = config.providers.get(name);
    let api_key = overrides
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone());

    let provider = match name {
        "openrouter" => OpenAiCompatProvider::openrouter(
            api_key.context("No API key configured (set PALAVER_API_KEY)")?,
        ),
        "openai" => OpenAiCompatProvider::openai(
            api_key.context("No API key configured (set PALAVER_API_KEY)")?,
        ),
        "ollama" => {
            OpenAiCompatProvider::ollama(overrides.and_then(|p| p.api_url.as_deref()))
        }
        other => {
            let Some(url) = overrides.and_then(|p| p.api_url.clone()) else {
                bail!("Unknown provider '{other}' and no [providers.{other}] api_url configured");
            };
            OpenAiCompatProvider::new(other, url, api_key.unwrap_or_default())
        }
    };

    Ok(Arc::new(provider))
}

/// Map the config file's session section onto the engine's tunables.
pub fn session_config(config: &AppConfig) -> SessionConfig {
    let s = &config.session;
    SessionConfig {
        token_ceiling: s.token_ceiling,
        restart_after_turns: s.restart_after_turns,
        observation_window: s.observation_window,
        observation_passthrough: s.observation_passthrough,
        tool_timeout: std::time::Duration::from_secs(s.tool_timeout_secs),
        thought_retries: s.thought_retries,
        retry_backoff: std::time::Duration::from_millis(s.retry_backoff_ms),
        error_backoff: std::time::Duration::from_millis(s.error_backoff_ms),
        max_response_tokens: (s.max_response_tokens > 0).then_some(s.max_response_tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_maps_all_fields() {
        let mut config = AppConfig::default();
        config.session.token_ceiling = 9000;
        config.session.tool_timeout_secs = 15;
        config.session.max_response_tokens = 512;

        let sc = session_config(&config);
        assert_eq!(sc.token_ceiling, 9000);
        assert_eq!(sc.tool_timeout, std::time::Duration::from_secs(15));
        assert_eq!(sc.max_response_tokens, Some(512));
    }

    #[test]
    fn zero_max_tokens_means_provider_default() {
        let config = AppConfig::default();
        assert_eq!(session_config(&config).max_response_tokens, None);
    }

    #[test]
    fn unknown_provider_without_url_fails() {
        let mut config = AppConfig::default();
        config.default_provider = "mystery".into();
        assert!(build_provider(&config).is_err());
    }

    #[test]
    fn ollama_needs_no_key() {
        let mut config = AppConfig::default();
        config.default_provider = "ollama".into();
        assert!(build_provider(&config).is_ok());
    }
}
