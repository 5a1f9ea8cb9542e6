//! Networking tests over real TCP sockets.

mod common;

use common::{create_peer_config, fast_timing, id, reach};
use peerlock::core::config::Config;
use peerlock::core::error::PeerError;
use peerlock::core::runtime::Runtime;
use peerlock::net::registry::{MemoryRegistry, Registry, RegistryClient, RegistryService};
use peerlock::net::server::RpcListener;
use peerlock::net::transport::TcpTransport;
use peerlock::protocol::peer::Peer;
use peerlock::protocol::state::{PeerId, Phase};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn roster() -> Vec<PeerId> {
    vec![id("PeerA"), id("PeerB")]
}

/// Start a peer listening on an ephemeral port and register it.
async fn spawn_peer(
    name: &str,
    registry: Arc<dyn Registry>,
    shutdown_rx: watch::Receiver<bool>,
) -> Arc<Peer> {
    let mut timing = fast_timing();
    timing.call_timeout_ms = 500;

    let transport = Arc::new(TcpTransport::new(
        Arc::clone(&registry),
        timing.call_timeout(),
    ));
    let peer = Peer::new(id(name), roster(), timing, transport);

    let listener = RpcListener::new("127.0.0.1:0".parse().unwrap(), shutdown_rx);
    let socket = listener.bind().await.unwrap();
    let addr = socket.local_addr().unwrap();
    let handler = Arc::clone(&peer);
    tokio::spawn(async move { listener.serve(socket, handler).await });

    registry.register(peer.id(), addr).await.unwrap();
    peer
}

/// Serve a registry on an ephemeral port.
async fn spawn_registry(shutdown_rx: watch::Receiver<bool>) -> SocketAddr {
    let listener = RpcListener::new("127.0.0.1:0".parse().unwrap(), shutdown_rx);
    let socket = listener.bind().await.unwrap();
    let addr = socket.local_addr().unwrap();
    let service = Arc::new(RegistryService::new(Arc::new(MemoryRegistry::new())));
    tokio::spawn(async move { listener.serve(socket, service).await });
    addr
}

#[tokio::test]
async fn peers_pass_the_resource_over_tcp() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let registry: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());

    let a = spawn_peer("PeerA", Arc::clone(&registry), shutdown_rx.clone()).await;
    let b = spawn_peer("PeerB", Arc::clone(&registry), shutdown_rx).await;
    assert_eq!(a.rediscover().await, vec![id("PeerB")]);
    assert_eq!(b.rediscover().await, vec![id("PeerA")]);

    a.issue_request().await.unwrap();
    assert!(reach(&a, Phase::Held).await);

    b.issue_request().await.unwrap();
    assert_eq!(b.phase(), Phase::Wanted);
    assert!(a.inspect(|s| s.deferred.contains(&id("PeerB"))));

    assert!(a.release_resource().await);
    assert!(reach(&b, Phase::Held).await);
}

#[tokio::test]
async fn remote_registry_resolves_peers() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let registry_addr = spawn_registry(shutdown_rx.clone()).await;
    let client = RegistryClient::new(registry_addr, Duration::from_millis(500));

    let missing = client.lookup(&id("PeerA")).await.unwrap_err();
    assert!(matches!(missing, PeerError::NotFound { .. }));

    let registry: Arc<dyn Registry> = Arc::new(client.clone());
    let a = spawn_peer("PeerA", Arc::clone(&registry), shutdown_rx.clone()).await;
    let b = spawn_peer("PeerB", registry, shutdown_rx).await;

    assert!(client.lookup(a.id()).await.is_ok());
    assert_eq!(a.rediscover().await, vec![id("PeerB")]);

    client.remove(b.id()).await.unwrap();
    assert!(matches!(
        client.lookup(b.id()).await,
        Err(PeerError::NotFound { .. })
    ));
}

#[tokio::test]
async fn stopped_peer_is_evicted_by_heartbeat() {
    let registry: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());
    let (_a_tx, a_rx) = watch::channel(false);
    let (b_tx, b_rx) = watch::channel(false);

    let a = spawn_peer("PeerA", Arc::clone(&registry), a_rx).await;
    let b = spawn_peer("PeerB", registry, b_rx).await;
    a.rediscover().await;
    assert!(a.inspect(|s| s.membership.is_active(b.id())));

    b_tx.send(true).unwrap();
    // Give the listener a moment to close its socket.
    tokio::time::sleep(Duration::from_millis(50)).await;

    a.send_heartbeats().await;
    assert!(!a.inspect(|s| s.membership.is_active(&id("PeerB"))));
}

#[tokio::test]
async fn runtimes_meet_through_embedded_registry() {
    let host_file = create_peer_config("PeerA", "embedded");
    let mut host = Runtime::new(Config::from_file(host_file.path()).unwrap()).unwrap();
    host.start().await.unwrap();
    let registry_addr = host.registry_addr().unwrap();

    let guest_file = create_peer_config("PeerB", "external");
    let mut guest_config = Config::from_file(guest_file.path()).unwrap();
    guest_config.registry.address = registry_addr.to_string();
    let mut guest = Runtime::new(guest_config).unwrap();
    guest.start().await.unwrap();

    let a = Arc::clone(host.peer().unwrap());
    let b = Arc::clone(guest.peer().unwrap());
    assert!(b.inspect(|s| s.membership.is_active(&id("PeerA"))));
    a.rediscover().await;
    assert!(a.inspect(|s| s.membership.is_active(&id("PeerB"))));

    b.request_resource().await.unwrap();
    assert!(reach(&b, Phase::Held).await);
    assert!(b.release_resource().await);

    guest.stop().await.unwrap();
    let client = RegistryClient::new(registry_addr, Duration::from_millis(500));
    assert!(matches!(
        client.lookup(&id("PeerB")).await,
        Err(PeerError::NotFound { .. })
    ));

    host.stop().await.unwrap();
}
