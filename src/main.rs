use academia_core::{config::Config, server, telemetry};
use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Initialize tracing and the Prometheus recorder
    let metrics_handle = telemetry::init();

    info!("Starting Academia Core Service");
    info!("HTTP server listening on {}", config.http_addr());

    // Run the server
    server::run(config, metrics_handle).await
}
