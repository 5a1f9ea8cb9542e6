//! Wire messages.
//!
//! Peers exchange [`Rpc`] frames and answer each with an [`RpcResponse`].
//! The registry uses its own request/response pair over the same framing.

use crate::protocol::state::PeerId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Remote-callable peer operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rpc {
    /// Ask for permission to enter the critical section.
    Request { requester: PeerId, timestamp: u64 },
    /// Grant a previously received request.
    Reply { responder: PeerId },
    /// Liveness ping.
    Heartbeat { sender: PeerId },
}

impl Rpc {
    /// The peer that sent this message.
    pub fn sender(&self) -> &PeerId {
        match self {
            Self::Request { requester, .. } => requester,
            Self::Reply { responder } => responder,
            Self::Heartbeat { sender } => sender,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Reply { .. } => "reply",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Answer to an [`Rpc`].
///
/// For `Request`, `accepted` says whether the grant was sent immediately
/// (true) or deferred (false). `Reply` and `Heartbeat` always acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub accepted: bool,
}

/// Registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryRequest {
    Register { name: PeerId, address: SocketAddr },
    Lookup { name: PeerId },
    Remove { name: PeerId },
}

/// Registry answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryResponse {
    Registered,
    Address { address: SocketAddr },
    Removed,
    NotFound { name: PeerId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_json_shape() {
        let rpc = Rpc::Request {
            requester: PeerId::from("PeerA"),
            timestamp: 5,
        };
        let json = serde_json::to_string(&rpc).unwrap();
        assert_eq!(
            json,
            r#"{"type":"request","requester":"PeerA","timestamp":5}"#
        );
    }

    #[test]
    fn test_rpc_sender() {
        let rpc = Rpc::Heartbeat {
            sender: PeerId::from("PeerC"),
        };
        assert_eq!(rpc.sender(), &PeerId::from("PeerC"));
        assert_eq!(rpc.kind(), "heartbeat");
    }
}
