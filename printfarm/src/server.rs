//! HTTP server lifecycle
//!
//! Serves the router until Ctrl+C or SIGTERM, then stops every device
//! session and media relay.

use std::net::SocketAddr;
use std::sync::Arc;

use printfarm_core::Config;
use printfarm_device::DeviceRegistry;
use tracing::{error, info};

pub struct PrintFarmServer {
    config: Config,
    registry: Arc<DeviceRegistry>,
}

impl PrintFarmServer {
    pub const fn new(config: Config, registry: Arc<DeviceRegistry>) -> Self {
        Self { config, registry }
    }

    /// Serve HTTP and wait for a shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        let http_address = self.config.http_address();
        let http_addr: SocketAddr = http_address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{http_address}': {e}"))?;

        let listener = tokio::net::TcpListener::bind(http_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_addr}: {e}"))?;
        info!("HTTP server listening on {}", http_addr);

        let router = printfarm_api::create_router(self.registry.clone());
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("HTTP server error: {}", e);
        }
        info!("HTTP server shut down gracefully");

        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        info!("Stopping device sessions and media relays...");
        // Transcoder processes are killed when their handles drop
        self.registry.shutdown();
        info!("Printer farm stopped");
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
