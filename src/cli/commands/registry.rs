//! Registry command implementation.

use super::{init_tracing, load_config};
use crate::net::registry::{MemoryRegistry, RegistryService};
use crate::net::server::RpcListener;
use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Run a standalone registry.
#[derive(Args, Debug, Default)]
pub struct RegistryArgs {
    /// Bind address (defaults to `registry.address` from the config).
    #[arg(long)]
    pub bind: Option<String>,
}

/// Run the registry command until Ctrl-C.
pub async fn run_registry(
    args: RegistryArgs,
    config_path: Option<&Path>,
    log_level: Option<String>,
) -> Result<()> {
    let config = load_config(config_path)?;
    init_tracing(log_level.as_deref().unwrap_or(&config.telemetry.log_level));

    let bind = args.bind.unwrap_or(config.registry.address);
    let bind: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid registry bind address: {}", bind))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = RpcListener::new(bind, shutdown_rx);
    let socket = listener
        .bind()
        .await
        .with_context(|| format!("failed to bind registry on {}", bind))?;

    let store = Arc::new(MemoryRegistry::new());
    let service = Arc::new(RegistryService::new(Arc::clone(&store)));
    let server = tokio::spawn(async move { listener.serve(socket, service).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::warn!(registered = store.len(), "shutdown signal received (SIGINT)");

    let _ = shutdown_tx.send(true);
    server.await.context("registry task panicked")?;
    Ok(())
}
