//! # Live Relay
//!
//! Relays live-stream gift and chat events to a pub/sub bus with team
//! attribution.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Redis and coordinator collaborators
//! - HTTP control API

use anyhow::Result;
use tracing::info;

use live_relay::config::Settings;
use live_relay::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    live_relay::telemetry::init_tracing();

    info!("Starting Live Relay...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept requests");
    application.run_until_stopped().await?;

    Ok(())
}
