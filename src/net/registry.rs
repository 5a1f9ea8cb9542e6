//! Registry (naming service).
//!
//! Peers publish their RPC address under their roster name and look each
//! other up by name. The registry can live in-process ([`MemoryRegistry`]),
//! be served to other processes ([`RegistryService`]), or be reached over
//! TCP ([`RegistryClient`]).

use super::message::{RegistryRequest, RegistryResponse};
use super::server::FrameHandler;
use super::transport::call_endpoint;
use crate::core::error::{PeerError, PeerResult};
use crate::protocol::state::PeerId;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Name-to-address lookup.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Publish `name` at `address`, replacing any previous entry.
    async fn register(&self, name: &PeerId, address: SocketAddr) -> PeerResult<()>;

    /// Resolve `name`. Fails with `NotFound` when unregistered.
    async fn lookup(&self, name: &PeerId) -> PeerResult<SocketAddr>;

    /// Withdraw `name`. Removing an absent name is not an error.
    async fn remove(&self, name: &PeerId) -> PeerResult<()>;
}

/// In-process registry store.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<PeerId, SocketAddr>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn apply(&self, request: RegistryRequest) -> RegistryResponse {
        match request {
            RegistryRequest::Register { name, address } => {
                tracing::info!(name = %name, address = %address, "registered");
                self.entries.write().insert(name, address);
                RegistryResponse::Registered
            }
            RegistryRequest::Lookup { name } => match self.entries.read().get(&name) {
                Some(address) => RegistryResponse::Address { address: *address },
                None => RegistryResponse::NotFound { name },
            },
            RegistryRequest::Remove { name } => {
                if self.entries.write().remove(&name).is_some() {
                    tracing::info!(name = %name, "deregistered");
                }
                RegistryResponse::Removed
            }
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, name: &PeerId, address: SocketAddr) -> PeerResult<()> {
        self.apply(RegistryRequest::Register {
            name: name.clone(),
            address,
        });
        Ok(())
    }

    async fn lookup(&self, name: &PeerId) -> PeerResult<SocketAddr> {
        match self.apply(RegistryRequest::Lookup { name: name.clone() }) {
            RegistryResponse::Address { address } => Ok(address),
            _ => Err(PeerError::not_found(name)),
        }
    }

    async fn remove(&self, name: &PeerId) -> PeerResult<()> {
        self.apply(RegistryRequest::Remove { name: name.clone() });
        Ok(())
    }
}

/// Serves a [`MemoryRegistry`] over the frame protocol.
pub struct RegistryService {
    store: Arc<MemoryRegistry>,
}

impl RegistryService {
    /// Serve `store`.
    pub fn new(store: Arc<MemoryRegistry>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FrameHandler for RegistryService {
    type Request = RegistryRequest;
    type Response = RegistryResponse;

    async fn handle(&self, request: RegistryRequest) -> RegistryResponse {
        self.store.apply(request)
    }

    fn service_name(&self) -> &'static str {
        "registry"
    }
}

/// Client for a remote [`RegistryService`].
#[derive(Debug, Clone)]
pub struct RegistryClient {
    endpoint: SocketAddr,
    timeout: Duration,
}

impl RegistryClient {
    /// Create a client for the registry at `endpoint`.
    pub fn new(endpoint: SocketAddr, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    /// The registry endpoint.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    async fn send(&self, name: &PeerId, request: RegistryRequest) -> PeerResult<RegistryResponse> {
        call_endpoint(self.endpoint, &request, self.timeout)
            .await
            .map_err(|reason| {
                PeerError::communication(name, format!("registry {}: {}", self.endpoint, reason))
            })
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn register(&self, name: &PeerId, address: SocketAddr) -> PeerResult<()> {
        let request = RegistryRequest::Register {
            name: name.clone(),
            address,
        };
        match self.send(name, request).await? {
            RegistryResponse::Registered => Ok(()),
            other => Err(PeerError::codec(format!(
                "unexpected registry answer: {:?}",
                other
            ))),
        }
    }

    async fn lookup(&self, name: &PeerId) -> PeerResult<SocketAddr> {
        match self
            .send(name, RegistryRequest::Lookup { name: name.clone() })
            .await?
        {
            RegistryResponse::Address { address } => Ok(address),
            RegistryResponse::NotFound { .. } => Err(PeerError::not_found(name)),
            other => Err(PeerError::codec(format!(
                "unexpected registry answer: {:?}",
                other
            ))),
        }
    }

    async fn remove(&self, name: &PeerId) -> PeerResult<()> {
        match self
            .send(name, RegistryRequest::Remove { name: name.clone() })
            .await?
        {
            RegistryResponse::Removed => Ok(()),
            other => Err(PeerError::codec(format!(
                "unexpected registry answer: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_registry_lifecycle() {
        let registry = MemoryRegistry::new();
        let name = PeerId::from("PeerA");
        let addr: SocketAddr = "127.0.0.1:7001".parse().unwrap();

        assert!(matches!(
            registry.lookup(&name).await,
            Err(PeerError::NotFound { .. })
        ));

        registry.register(&name, addr).await.unwrap();
        assert_eq!(registry.lookup(&name).await.unwrap(), addr);
        assert_eq!(registry.len(), 1);

        registry.remove(&name).await.unwrap();
        registry.remove(&name).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_register_replaces_address() {
        let registry = MemoryRegistry::new();
        let name = PeerId::from("PeerB");
        registry
            .register(&name, "127.0.0.1:7001".parse().unwrap())
            .await
            .unwrap();
        registry
            .register(&name, "127.0.0.1:7002".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(
            registry.lookup(&name).await.unwrap(),
            "127.0.0.1:7002".parse::<SocketAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_communication_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RegistryClient::new(addr, Duration::from_millis(200));
        let err = client.lookup(&PeerId::from("PeerA")).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
