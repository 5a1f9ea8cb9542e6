//! Peer state.
//!
//! One `PeerState` exists per process. It is owned by the
//! [`Peer`](super::peer::Peer) and only ever mutated under the peer's lock,
//! through the transitions in [`engine`](super::engine).

use super::membership::Membership;
use super::queue::DeferredQueue;
use crate::core::clock::LamportClock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Roster identity of a peer. Totally ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for PeerId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Phase of the mutual-exclusion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Not holding and not requesting.
    Released,
    /// Request issued, waiting for replies.
    Wanted,
    /// In the critical section.
    Held,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Released => write!(f, "RELEASED"),
            Self::Wanted => write!(f, "WANTED"),
            Self::Held => write!(f, "HELD"),
        }
    }
}

/// A request's position in the total order.
///
/// Field order matters: the derived `Ord` compares the timestamp first and
/// the identity only on ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestStamp {
    pub timestamp: u64,
    pub peer: PeerId,
}

impl RequestStamp {
    /// Create a request stamp.
    pub fn new(timestamp: u64, peer: PeerId) -> Self {
        Self { timestamp, peer }
    }
}

/// Protocol state of a single peer.
#[derive(Debug)]
pub struct PeerState {
    /// This peer's identity.
    pub id: PeerId,

    /// Current phase.
    pub phase: Phase,

    /// Lamport clock.
    pub clock: LamportClock,

    /// Timestamp of the outstanding request; `None` exactly when released.
    pub request_timestamp: Option<u64>,

    /// Peers whose grant is still awaited.
    pub pending_replies: BTreeSet<PeerId>,

    /// Requesters to answer on release, in arrival order.
    pub deferred: DeferredQueue,

    /// Active membership view.
    pub membership: Membership,
}

impl PeerState {
    /// Create the startup state: released, clock at zero, nothing known.
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            phase: Phase::Released,
            clock: LamportClock::new(),
            request_timestamp: None,
            pending_replies: BTreeSet::new(),
            deferred: DeferredQueue::new(),
            membership: Membership::new(),
        }
    }

    /// The stamp of the outstanding local request, if any.
    pub fn local_stamp(&self) -> Option<RequestStamp> {
        self.request_timestamp
            .map(|timestamp| RequestStamp::new(timestamp, self.id.clone()))
    }
}
