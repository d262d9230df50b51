//! PVM node entry point.

use anyhow::{Context, Result};
use node_runtime::{init_tracing, NodeConfig, NodeRuntime};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("failed to load configuration")?;
    init_tracing(config.log_json)?;

    info!("===========================================");
    info!("  PVM Node Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let runtime = NodeRuntime::build(config)?;
    let lifecycle = runtime.service().lifecycle().clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received");
                lifecycle.request_shutdown();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    runtime.run().await
}
