//! CLI command implementations.

mod config;
mod registry;
mod start;

pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use registry::{run_registry, RegistryArgs};
pub use start::{run_start, StartArgs};

use crate::core::config::Config;
use anyhow::{Context, Result};
use std::path::Path;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/peerlock.toml";

/// Load the configuration for a command.
///
/// An explicit path must exist. Without one, the default location is used
/// when present, and the built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Config::from_file(default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// Initialize the tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` takes precedence over `level`.
#[cfg(feature = "telemetry")]
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_level: &str) {}
