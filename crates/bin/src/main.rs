//! Gridcast - spatial cell broadcast game server.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Gridcast v{}", env!("CARGO_PKG_VERSION"));

    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!(
        "  Cells: {} units, {} ms tick, neighborhood radius {}",
        config.grid.cell_size, config.grid.tick_interval_ms, config.grid.neighborhood_radius
    );

    server::run(config).await?;

    Ok(())
}
