//! Error types for the peer and its collaborators.
//!
//! None of these cross the [`Peer`](crate::protocol::peer::Peer) boundary: the
//! protocol engine resolves every condition where it occurs (eviction, silent
//! skip, log-and-ignore, self-revert). They exist so that the transport,
//! registry, and codec layers can report what happened with a typed value.

use crate::protocol::state::{PeerId, Phase};
use thiserror::Error;

/// Common peer error conditions.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Remote call unreachable or timed out. Never distinguished further.
    #[error("communication with {peer} failed: {reason}")]
    Communication { peer: PeerId, reason: String },

    /// Registry lookup for an unregistered name.
    #[error("{name} is not registered")]
    NotFound { name: PeerId },

    /// Operation attempted from a phase that does not allow it.
    #[error("invalid transition: cannot {operation} while {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: Phase,
    },

    /// The grant never completed within the grant-wait bound.
    #[error("timed out after {waited_ms}ms waiting for {pending} replies")]
    LivenessTimeout { waited_ms: u64, pending: usize },

    /// Malformed or oversized frame.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Socket-level failure outside a peer call (bind, accept).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PeerError {
    /// Create a Communication error.
    pub fn communication(peer: &PeerId, reason: impl Into<String>) -> Self {
        Self::Communication {
            peer: peer.clone(),
            reason: reason.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(name: &PeerId) -> Self {
        Self::NotFound { name: name.clone() }
    }

    /// Create an InvalidTransition error.
    pub fn invalid_transition(operation: &'static str, phase: Phase) -> Self {
        Self::InvalidTransition { operation, phase }
    }

    /// Create a Codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Check if this error means "peer is unavailable right now".
    ///
    /// Only communication failures count; a missing registration is not a
    /// failure of the peer, it simply has not appeared yet.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Communication { .. } | Self::Io(_))
    }
}

/// Result type using PeerError.
pub type PeerResult<T> = Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = PeerError::invalid_transition("release", Phase::Wanted);
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot release while WANTED"
        );
    }

    #[test]
    fn test_unavailable_classification() {
        let peer = PeerId::from("PeerB");
        assert!(PeerError::communication(&peer, "connection refused").is_unavailable());
        assert!(!PeerError::not_found(&peer).is_unavailable());
        assert!(!PeerError::codec("bad frame").is_unavailable());
    }
}
