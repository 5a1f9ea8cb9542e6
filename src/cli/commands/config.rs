//! Config command implementation.

use super::load_config;
use crate::core::config::Config;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the effective configuration with defaults filled in.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => {
            let config = load_config(config_path)?;
            println!("{}", summarize(&config));
            Ok(())
        }
        ConfigCommand::Show { format } => {
            let config = load_config(config_path)?;
            println!("{}", render(&config, &format)?);
            Ok(())
        }
    }
}

fn summarize(config: &Config) -> String {
    format!(
        "✓ Configuration is valid\n  peer: {} on {}\n  roster: {}\n  registry: {} ({})",
        config.peer.name,
        config.peer.bind,
        config.roster.peers.join(", "),
        config.registry.address,
        config.registry.mode
    )
}

fn render(config: &Config, format: &str) -> Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(config)?),
        "toml" => config.to_toml(),
        other => anyhow::bail!("unknown format: {} (expected toml or json)", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_formats() {
        let config = Config::default();
        assert!(render(&config, "toml").unwrap().contains("[timing]"));
        assert!(render(&config, "json").unwrap().contains("\"roster\""));
        assert!(render(&config, "yaml").is_err());
    }

    #[test]
    fn test_summary_names_peer_and_registry() {
        let summary = summarize(&Config::default());
        assert!(summary.contains("PeerA"));
        assert!(summary.contains("external"));
    }
}
