//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use peerlock::core::config::TimingConfig;
use peerlock::net::loopback::LoopbackNetwork;
use peerlock::protocol::peer::Peer;
use peerlock::protocol::state::{PeerId, Phase};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::time::Instant;

/// Shorthand for a peer identity.
pub fn id(name: &str) -> PeerId {
    PeerId::from(name)
}

/// Timing scaled down for tests. Holds are long so tests release by hand.
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        hold_ms: 60_000,
        heartbeat_interval_ms: 100,
        heartbeat_timeout_ms: 300,
        failure_check_interval_ms: 150,
        call_timeout_ms: 100,
        grant_wait_multiplier: 2,
    }
}

/// Peers wired together over a [`LoopbackNetwork`].
pub struct Cluster {
    pub network: Arc<LoopbackNetwork>,
    pub peers: Vec<Arc<Peer>>,
}

impl Cluster {
    /// Create one peer per name, all sharing `timing`. Nobody knows anybody yet.
    pub fn new(names: &[&str], timing: TimingConfig) -> Self {
        let network = LoopbackNetwork::new();
        let roster: Vec<PeerId> = names.iter().map(|name| id(name)).collect();

        let peers = roster
            .iter()
            .map(|peer_id| {
                let peer = Peer::new(
                    peer_id.clone(),
                    roster.clone(),
                    timing.clone(),
                    network.endpoint(peer_id.clone()),
                );
                network.attach(&peer);
                peer
            })
            .collect();

        Self { network, peers }
    }

    /// Every peer rediscovers the others.
    pub async fn connect_all(&self) {
        for peer in &self.peers {
            peer.rediscover().await;
        }
    }

    /// Look a peer up by name.
    pub fn peer(&self, name: &str) -> &Arc<Peer> {
        self.peers
            .iter()
            .find(|peer| peer.id().as_str() == name)
            .unwrap_or_else(|| panic!("no peer named {}", name))
    }

    /// Peers currently in the critical section.
    pub fn holders(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|peer| peer.phase() == Phase::Held)
            .map(|peer| peer.id().clone())
            .collect()
    }
}

/// Wait (in virtual or real time) until `peer` reaches `phase`, up to 5s.
pub async fn reach(peer: &Arc<Peer>, phase: Phase) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while peer.phase() != phase {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

/// Write `content` to a temporary config file.
pub fn create_config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// A complete config naming `name` within a two-peer roster.
pub fn create_peer_config(name: &str, registry_mode: &str) -> NamedTempFile {
    create_config_file(&format!(
        r#"
[peer]
name = "{}"
bind = "127.0.0.1:0"

[roster]
peers = ["PeerA", "PeerB"]

[registry]
mode = "{}"
address = "127.0.0.1:0"

[timing]
hold_ms = 60000
heartbeat_interval_ms = 100
heartbeat_timeout_ms = 300
failure_check_interval_ms = 150
call_timeout_ms = 500
"#,
        name, registry_mode
    ))
}
