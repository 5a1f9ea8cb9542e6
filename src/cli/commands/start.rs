//! Start command implementation.

use super::{init_tracing, load_config};
use crate::cli::console::run_console;
use crate::core::config::ConfigOverrides;
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;
use tokio::io::BufReader;

/// Start a peer.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Roster name of this peer.
    pub name: Option<String>,

    /// RPC bind address.
    #[arg(long)]
    pub bind: Option<String>,

    /// Registry address.
    #[arg(long)]
    pub registry: Option<String>,

    /// Host the registry in this process.
    #[arg(long)]
    pub embedded_registry: bool,

    /// Run without the interactive console until Ctrl-C.
    #[arg(long)]
    pub headless: bool,
}

/// Run the start command.
pub async fn run_start(
    args: StartArgs,
    config_path: Option<&Path>,
    log_level: Option<String>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.apply_overrides(&ConfigOverrides {
        name: args.name,
        bind: args.bind,
        registry: args.registry,
        embedded_registry: args.embedded_registry,
        log_level,
    });
    config.validate().context("invalid configuration")?;

    init_tracing(&config.telemetry.log_level);

    let mut runtime = Runtime::new(config)?;
    if args.headless {
        runtime.run_with(|_| std::future::pending()).await
    } else {
        runtime
            .run_with(|peer| {
                run_console(peer, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            })
            .await
    }
}
