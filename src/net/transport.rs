//! Outbound peer calls.
//!
//! The protocol engine never sees an error from a call. It sees a
//! [`CallOutcome`]: the call was delivered, or the target is unreachable.
//! Timeouts, refused connections, resets, and bad answers all collapse into
//! `Unreachable`.

use super::codec::{read_frame, write_frame};
use super::message::{Rpc, RpcResponse};
use super::registry::Registry;
use crate::core::error::{PeerError, PeerResult};
use crate::protocol::state::PeerId;
use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Result of a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The target answered. Carries its `accepted` flag.
    Delivered(bool),
    /// The target could not be reached in time.
    Unreachable(String),
}

impl CallOutcome {
    /// Check if the call reached the target.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Invocation of remote peer operations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `rpc` on `target`.
    async fn call(&self, target: &PeerId, rpc: Rpc) -> CallOutcome;

    /// Resolve `target` and verify it can be reached.
    ///
    /// Fails with `NotFound` when the target has never registered, and with
    /// `Communication` when it is registered but unreachable.
    async fn probe(&self, target: &PeerId) -> PeerResult<()>;
}

/// Send one request frame to `addr` and read one response frame, all within
/// `timeout`.
pub async fn call_endpoint<Req, Resp>(
    addr: SocketAddr,
    request: &Req,
    timeout: Duration,
) -> std::result::Result<Resp, String>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    let exchange = async {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| format!("connect to {} failed: {}", addr, e))?;
        let _ = stream.set_nodelay(true);

        write_frame(&mut stream, request)
            .await
            .map_err(|e| e.to_string())?;

        let mut buffer = BytesMut::with_capacity(256);
        match read_frame(&mut stream, &mut buffer).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(format!("{} closed the connection without answering", addr)),
            Err(e) => Err(e.to_string()),
        }
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(format!("call to {} timed out after {:?}", addr, timeout)),
    }
}

/// TCP transport resolving peer names through a [`Registry`].
pub struct TcpTransport {
    /// Name service used to resolve peers.
    registry: Arc<dyn Registry>,

    /// Resolved addresses. Dropped on any failure so a restarted peer is
    /// looked up again.
    addresses: RwLock<HashMap<PeerId, SocketAddr>>,

    /// Fixed per-call timeout.
    call_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport.
    pub fn new(registry: Arc<dyn Registry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            addresses: RwLock::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Cached address for `peer`, if resolved.
    pub fn cached_address(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.addresses.read().get(peer).copied()
    }

    async fn resolve(&self, peer: &PeerId) -> PeerResult<SocketAddr> {
        if let Some(addr) = self.cached_address(peer) {
            return Ok(addr);
        }
        let addr = self.registry.lookup(peer).await?;
        self.addresses.write().insert(peer.clone(), addr);
        Ok(addr)
    }

    fn forget(&self, peer: &PeerId) {
        self.addresses.write().remove(peer);
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, target: &PeerId, rpc: Rpc) -> CallOutcome {
        let addr = match self.resolve(target).await {
            Ok(addr) => addr,
            Err(e) => return CallOutcome::Unreachable(e.to_string()),
        };

        match call_endpoint::<Rpc, RpcResponse>(addr, &rpc, self.call_timeout).await {
            Ok(response) => CallOutcome::Delivered(response.accepted),
            Err(reason) => {
                self.forget(target);
                CallOutcome::Unreachable(reason)
            }
        }
    }

    async fn probe(&self, target: &PeerId) -> PeerResult<()> {
        // Always ask the registry: the cached address may belong to a
        // previous incarnation of the peer.
        self.forget(target);
        let addr = self.resolve(target).await?;

        match tokio::time::timeout(self.call_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                self.forget(target);
                Err(PeerError::communication(target, e.to_string()))
            }
            Err(_) => {
                self.forget(target);
                Err(PeerError::communication(target, "connect timed out"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::registry::MemoryRegistry;

    #[tokio::test]
    async fn test_unregistered_target_is_unreachable() {
        let transport = TcpTransport::new(
            Arc::new(MemoryRegistry::new()),
            Duration::from_millis(200),
        );
        let target = PeerId::from("PeerZ");

        let outcome = transport
            .call(
                &target,
                Rpc::Heartbeat {
                    sender: PeerId::from("PeerA"),
                },
            )
            .await;
        assert!(!outcome.is_delivered());

        let err = transport.probe(&target).await.unwrap_err();
        assert!(matches!(err, PeerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable_and_uncached() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let registry = Arc::new(MemoryRegistry::new());
        let target = PeerId::from("PeerB");
        registry.register(&target, addr).await.unwrap();

        let transport = TcpTransport::new(registry, Duration::from_millis(200));
        let outcome = transport
            .call(
                &target,
                Rpc::Reply {
                    responder: PeerId::from("PeerA"),
                },
            )
            .await;

        assert!(matches!(outcome, CallOutcome::Unreachable(_)));
        assert!(transport.cached_address(&target).is_none());

        let err = transport.probe(&target).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
