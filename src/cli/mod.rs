//! Command-line interface.
//!
//! Unified CLI for running peers and the registry.

pub mod commands;
pub mod console;

use clap::{Parser, Subcommand};

/// Peerlock - peer-to-peer mutual exclusion.
#[derive(Parser, Debug)]
#[command(name = "peerlock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a peer with an interactive console.
    Start(commands::StartArgs),
    /// Run a standalone registry.
    Registry(commands::RegistryArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
