//! In-process transport.
//!
//! A [`LoopbackNetwork`] connects peers living in one process by calling
//! their handlers directly. It supports:
//! - Crashing a peer or cutting the link between two peers
//! - Fixed latency per call, so concurrent requests really cross
//! - A log of every delivered call, in send order

use super::message::Rpc;
use super::transport::{CallOutcome, Transport};
use crate::core::error::{PeerError, PeerResult};
use crate::protocol::peer::Peer;
use crate::protocol::state::PeerId;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// One call that reached its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Caller.
    pub from: PeerId,
    /// Callee.
    pub to: PeerId,
    /// The call.
    pub rpc: Rpc,
}

#[derive(Default)]
struct Links {
    peers: HashMap<PeerId, Weak<Peer>>,
    crashed: HashSet<PeerId>,
    severed: HashSet<(PeerId, PeerId)>,
}

/// Shared switchboard for in-process peers.
#[derive(Default)]
pub struct LoopbackNetwork {
    links: RwLock<Links>,
    latency: RwLock<Duration>,
    log: RwLock<Vec<Delivery>>,
}

impl LoopbackNetwork {
    /// Create an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create the transport `from` uses to reach the others.
    pub fn endpoint(self: &Arc<Self>, from: PeerId) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport {
            network: Arc::clone(self),
            from,
        })
    }

    /// Make `peer` reachable under its own name.
    pub fn attach(&self, peer: &Arc<Peer>) {
        self.links
            .write()
            .peers
            .insert(peer.id().clone(), Arc::downgrade(peer));
    }

    /// Make `peer` unreachable as if it had never registered.
    pub fn detach(&self, peer: &PeerId) {
        self.links.write().peers.remove(peer);
    }

    /// Stop all traffic to and from `peer`.
    pub fn crash(&self, peer: &PeerId) {
        self.links.write().crashed.insert(peer.clone());
    }

    /// Undo [`crash`](Self::crash).
    pub fn restore(&self, peer: &PeerId) {
        self.links.write().crashed.remove(peer);
    }

    /// Cut the link between `a` and `b` in both directions.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        let mut links = self.links.write();
        links.severed.insert((a.clone(), b.clone()));
        links.severed.insert((b.clone(), a.clone()));
    }

    /// Undo [`disconnect`](Self::disconnect).
    pub fn reconnect(&self, a: &PeerId, b: &PeerId) {
        let mut links = self.links.write();
        links.severed.remove(&(a.clone(), b.clone()));
        links.severed.remove(&(b.clone(), a.clone()));
    }

    /// Delay every subsequent call by `latency` before it is handled.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Every delivered call so far, in send order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log.read().clone()
    }

    /// Forget recorded deliveries.
    pub fn clear_log(&self) {
        self.log.write().clear();
    }

    fn route(&self, from: &PeerId, to: &PeerId) -> PeerResult<Arc<Peer>> {
        let links = self.links.read();
        let peer = links
            .peers
            .get(to)
            .and_then(Weak::upgrade)
            .ok_or_else(|| PeerError::not_found(to))?;

        if links.crashed.contains(from) {
            return Err(PeerError::communication(to, format!("{} is down", from)));
        }
        if links.crashed.contains(to) {
            return Err(PeerError::communication(to, "peer is down"));
        }
        if links.severed.contains(&(from.clone(), to.clone())) {
            return Err(PeerError::communication(to, "link severed"));
        }
        Ok(peer)
    }
}

/// Per-peer handle on a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    from: PeerId,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn call(&self, target: &PeerId, rpc: Rpc) -> CallOutcome {
        let peer = match self.network.route(&self.from, target) {
            Ok(peer) => peer,
            Err(e) => return CallOutcome::Unreachable(e.to_string()),
        };

        self.network.log.write().push(Delivery {
            from: self.from.clone(),
            to: target.clone(),
            rpc: rpc.clone(),
        });

        let latency = *self.network.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        CallOutcome::Delivered(peer.dispatch(rpc).await.accepted)
    }

    async fn probe(&self, target: &PeerId) -> PeerResult<()> {
        self.network.route(&self.from, target).map(|_| ())
    }
}
