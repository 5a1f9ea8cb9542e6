//! Configuration parsing and validation.
//!
//! Peer configuration is loaded from an optional TOML file with CLI overrides.
//! Every field has a built-in default, so a peer can start from the roster
//! name alone.

use crate::protocol::state::PeerId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Top-level peer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// This peer's identity and RPC listener.
    #[serde(default)]
    pub peer: PeerConfig,

    /// The static set of peer identities.
    #[serde(default)]
    pub roster: RosterConfig,

    /// Registry (naming service) configuration.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Protocol timing constants.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Local peer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Roster name this process runs as.
    #[serde(default = "default_peer_name")]
    pub name: String,

    /// RPC listener bind address. Port 0 lets the OS choose; the resolved
    /// address is what gets registered.
    #[serde(default = "default_peer_bind")]
    pub bind: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: default_peer_name(),
            bind: default_peer_bind(),
        }
    }
}

/// Static roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Every peer identity that may ever participate.
    #[serde(default = "default_roster")]
    pub peers: Vec<String>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            peers: default_roster(),
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Mode: "embedded" (this peer hosts the registry) or "external".
    #[serde(default = "default_registry_mode")]
    pub mode: String,

    /// Registry address: bind address in embedded mode, endpoint otherwise.
    #[serde(default = "default_registry_address")]
    pub address: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mode: default_registry_mode(),
            address: default_registry_address(),
        }
    }
}

impl RegistryConfig {
    /// Whether this process hosts the registry.
    pub fn is_embedded(&self) -> bool {
        self.mode == "embedded"
    }
}

/// Protocol timing constants, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How long the simulated resource is held before automatic release.
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,

    /// Heartbeat send interval.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// A peer silent for longer than this is evicted.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Failure-checker interval.
    #[serde(default = "default_failure_check_interval_ms")]
    pub failure_check_interval_ms: u64,

    /// Per remote call timeout.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Grant-wait bound as a multiple of `call_timeout_ms` per recipient.
    #[serde(default = "default_grant_wait_multiplier")]
    pub grant_wait_multiplier: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            hold_ms: default_hold_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            failure_check_interval_ms: default_failure_check_interval_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            grant_wait_multiplier: default_grant_wait_multiplier(),
        }
    }
}

impl TimingConfig {
    /// Critical-section hold duration.
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    /// Heartbeat send interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Staleness threshold.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Failure-checker interval.
    pub fn failure_check_interval(&self) -> Duration {
        Duration::from_millis(self.failure_check_interval_ms)
    }

    /// Per remote call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Overall bound on waiting for a grant from `recipients` peers.
    pub fn grant_wait(&self, recipients: usize) -> Duration {
        let factor = u32::try_from(recipients.max(1))
            .unwrap_or(u32::MAX)
            .saturating_mul(self.grant_wait_multiplier);
        self.call_timeout().saturating_mul(factor)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_peer_name() -> String {
    "PeerA".to_string()
}

fn default_peer_bind() -> String {
    "127.0.0.1:0".to_string()
}

fn default_roster() -> Vec<String> {
    ["PeerA", "PeerB", "PeerC", "PeerD"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn default_registry_mode() -> String {
    "external".to_string()
}

fn default_registry_address() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_hold_ms() -> u64 {
    8_000
}

fn default_heartbeat_interval_ms() -> u64 {
    2_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    5_000
}

fn default_failure_check_interval_ms() -> u64 {
    5_000
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

fn default_grant_wait_multiplier() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref name) = overrides.name {
            self.peer.name = name.clone();
        }
        if let Some(ref bind) = overrides.bind {
            self.peer.bind = bind.clone();
        }
        if let Some(ref registry) = overrides.registry {
            self.registry.address = registry.clone();
        }
        if overrides.embedded_registry {
            self.registry.mode = "embedded".to_string();
        }
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
    }

    /// This peer's identity.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from(self.peer.name.as_str())
    }

    /// The roster as peer identities.
    pub fn roster(&self) -> Vec<PeerId> {
        self.roster
            .peers
            .iter()
            .map(|name| PeerId::from(name.as_str()))
            .collect()
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_roster()?;
        self.validate_registry()?;
        self.validate_timing()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_roster(&self) -> Result<()> {
        if self.roster.peers.is_empty() {
            anyhow::bail!("roster.peers must not be empty");
        }

        let mut seen = HashSet::new();
        for name in &self.roster.peers {
            if name.trim().is_empty() {
                anyhow::bail!("roster.peers must not contain empty names");
            }
            if !seen.insert(name.as_str()) {
                anyhow::bail!("roster.peers contains duplicate name: {}", name);
            }
        }

        if !seen.contains(self.peer.name.as_str()) {
            anyhow::bail!(
                "peer.name {} is not in roster.peers {:?}",
                self.peer.name,
                self.roster.peers
            );
        }

        self.peer
            .bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("peer.bind is not a socket address: {}", self.peer.bind))?;

        Ok(())
    }

    fn validate_registry(&self) -> Result<()> {
        if self.registry.mode != "embedded" && self.registry.mode != "external" {
            anyhow::bail!(
                "registry.mode must be 'embedded' or 'external', got: {}",
                self.registry.mode
            );
        }

        self.registry
            .address
            .parse::<std::net::SocketAddr>()
            .with_context(|| {
                format!(
                    "registry.address is not a socket address: {}",
                    self.registry.address
                )
            })?;

        Ok(())
    }

    fn validate_timing(&self) -> Result<()> {
        let timing = &self.timing;
        let durations = [
            ("hold_ms", timing.hold_ms),
            ("heartbeat_interval_ms", timing.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", timing.heartbeat_timeout_ms),
            ("failure_check_interval_ms", timing.failure_check_interval_ms),
            ("call_timeout_ms", timing.call_timeout_ms),
        ];
        for (field, value) in durations {
            if value == 0 {
                anyhow::bail!("timing.{} must be > 0", field);
            }
        }

        // A timeout at or below the send interval evicts healthy peers.
        if timing.heartbeat_timeout_ms <= timing.heartbeat_interval_ms {
            anyhow::bail!(
                "timing.heartbeat_timeout_ms ({}) must exceed timing.heartbeat_interval_ms ({})",
                timing.heartbeat_timeout_ms,
                timing.heartbeat_interval_ms
            );
        }

        if timing.grant_wait_multiplier == 0 {
            anyhow::bail!("timing.grant_wait_multiplier must be >= 1");
        }

        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override peer name.
    pub name: Option<String>,
    /// Override RPC bind address.
    pub bind: Option<String>,
    /// Override registry address.
    pub registry: Option<String>,
    /// Host the registry in this process.
    pub embedded_registry: bool,
    /// Override log level.
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.roster().len(), 4);
        assert_eq!(config.timing.hold(), Duration::from_secs(8));
    }

    #[test]
    fn test_grant_wait_scales_with_recipients() {
        let timing = TimingConfig::default();
        assert_eq!(timing.grant_wait(0), Duration::from_secs(10));
        assert_eq!(timing.grant_wait(1), Duration::from_secs(10));
        assert_eq!(timing.grant_wait(3), Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            name: Some("PeerC".to_string()),
            embedded_registry: true,
            ..Default::default()
        });
        assert_eq!(config.peer_id(), PeerId::from("PeerC"));
        assert!(config.registry.is_embedded());
        config.validate().unwrap();
    }
}
