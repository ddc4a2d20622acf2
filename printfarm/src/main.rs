mod server;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use printfarm_core::{bootstrap::load_config, logging};
use printfarm_device::DeviceRegistry;
use printfarm_hub::BroadcastHub;

use server::PrintFarmServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = load_config()?;

    // 1.5. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Printer farm starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Broadcast hub shared by every device and viewer
    let hub = Arc::new(BroadcastHub::new());

    // 4. One session and relay per printer, connecting immediately
    let registry = Arc::new(DeviceRegistry::from_config(&config, hub)?);
    info!(printers = registry.len(), "Device registry initialized");
    registry.start();

    // 5. Serve until a shutdown signal arrives
    PrintFarmServer::new(config, registry).start().await
}
