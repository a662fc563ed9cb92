use anyhow::{Context, Result};
use tracing::info;

use shipper::conf::ShipperConfig;
use shipper::runtime::{boot, serve, stop};

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: basic tracing while the config is loaded
    let basic_logging = boot::init_logging_basic();

    info!("Starting nginx log shipper v{}", env!("CARGO_PKG_VERSION"));

    let config = ShipperConfig::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    // Phase 2: configured level and format
    drop(basic_logging);
    boot::init_logging(&config.logging);

    let shipper = boot::boot(config).await.context("Failed to start shipper")?;
    serve::run(shipper, stop::shutdown_signal())
        .await
        .context("Shipper stopped with an error")?;

    info!("Shut down gracefully");
    Ok(())
}
