//! Peerlock - unified CLI entrypoint.
//!
//! Usage:
//!   peerlock start PeerA --embedded-registry
//!   peerlock start PeerB --registry 127.0.0.1:9090
//!   peerlock registry --bind 127.0.0.1:9090
//!   peerlock config validate --config config/peerlock.toml

use anyhow::Result;
use clap::Parser;
use peerlock::cli::commands::{run_config, run_registry, run_start};
use peerlock::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Start(args) => run_start(args, config_path.as_deref(), cli.log_level).await,
        Commands::Registry(args) => {
            run_registry(args, config_path.as_deref(), cli.log_level).await
        }
        Commands::Config(args) => run_config(args, config_path.as_deref()),
    }
}
