//! `palaver doctor` — diagnose configuration and collaborator health.

use palaver_config::AppConfig;
use palaver_core::Provider;
use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    println!("Configuration: ok");

    if config.has_api_key() {
        println!("API key: present");
    } else {
        println!("API key: MISSING (set PALAVER_API_KEY or [api_key] in config)");
    }

    println!("Provider: {} / {}", config.default_provider, config.default_model);
    match super::build_provider(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("Provider health: ok"),
            Ok(false) => println!("Provider health: UNREACHABLE"),
            Err(e) => println!("Provider health: ERROR ({e})"),
        },
        Err(e) => println!("Provider: ERROR ({e})"),
    }

    let enabled: Vec<&str> = config
        .channels
        .iter()
        .filter(|(_, c)| c.enabled)
        .map(|(name, _)| name.as_str())
        .collect();
    if enabled.is_empty() {
        println!("Channels: none enabled");
    } else {
        println!("Channels: {}", enabled.join(", "));
    }

    info!("Doctor finished");
    Ok(())
}
