mod bot;
mod config;
mod context;
mod gate;
mod llm;
mod platform;
mod split;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Pull in a .env file if one exists; the environment is the only
    // configuration surface.
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().await?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.model);
    info!("  History limit: {}", config.history_limit);
    info!("  Trigger patterns: {}", config.trigger_words.len());
    info!(
        "  Allowed channels: {}",
        if config.allowed_channels.is_empty() {
            "all".to_string()
        } else {
            config.allowed_channels.len().to_string()
        }
    );
    info!(
        "  Allowed users: {}",
        if config.allowed_users.is_empty() {
            "all".to_string()
        } else {
            config.allowed_users.len().to_string()
        }
    );

    info!("Bot is starting...");
    platform::discord::run(Arc::new(config)).await
}
