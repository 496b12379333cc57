//! # Parlor Server
//!
//! Realtime 1:1 chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with a parlor.toml in the working directory or /etc/parlor
//! PARLOR_JWT_SECRET=change-me parlor
//!
//! # Run with environment variables
//! PARLOR_PORT=8080 PARLOR_HOST=0.0.0.0 PARLOR_JWT_SECRET=change-me parlor
//! ```

use anyhow::Result;
use parlor_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,parlor_core=debug,parlor_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Parlor server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
