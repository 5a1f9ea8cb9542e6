//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: registry → transport → peer → RPC listener → registration → failure detector
//! - Shutdown order: signal → deregistration → background tasks

use crate::core::config::Config;
use crate::net::registry::{MemoryRegistry, Registry, RegistryClient, RegistryService};
use crate::net::server::RpcListener;
use crate::net::transport::TcpTransport;
use crate::protocol::detector::FailureDetector;
use crate::protocol::peer::Peer;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long `stop` waits for background tasks.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Registry (embedded service or client).
    pub registry: ComponentHealth,
    /// Peer RPC listener.
    pub listener: ComponentHealth,
    /// Heartbeat and failure-check tasks.
    pub detector: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            registry: ComponentHealth::Starting,
            listener: ComponentHealth::Starting,
            detector: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if every component is up.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.registry, self.listener, self.detector),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy,
                ComponentHealth::Healthy
            )
        )
    }
}

/// Runtime holding all component handles for one peer process.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Name service in use.
    registry: Option<Arc<dyn Registry>>,

    /// Address of the embedded registry, when hosted here.
    registry_addr: Option<SocketAddr>,

    /// The protocol peer.
    peer: Option<Arc<Peer>>,

    /// Address the peer's RPC listener is bound to.
    rpc_addr: Option<SocketAddr>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Listener and detector tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            registry: None,
            registry_addr: None,
            peer: None,
            rpc_addr: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the peer (once started).
    pub fn peer(&self) -> Option<&Arc<Peer>> {
        self.peer.as_ref()
    }

    /// Get the bound RPC address (once started).
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    /// Get the embedded registry address, if this process hosts it.
    pub fn registry_addr(&self) -> Option<SocketAddr> {
        self.registry_addr
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Initialize and start all runtime components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(peer = %self.config.peer.name, "starting peer runtime");

        let registry = self.init_registry().await?;
        let peer = self.init_peer(Arc::clone(&registry));
        self.start_listener(&peer, registry.as_ref()).await?;
        self.start_detector(&peer);

        let found = peer.rediscover().await;
        tracing::info!(peer = %peer.id(), active = ?found, "initial discovery complete");

        self.registry = Some(registry);
        self.peer = Some(peer);
        self.running.store(true, Ordering::Release);
        tracing::info!("peer runtime started");
        Ok(())
    }

    /// Start the registry: host it here or connect to the external one.
    async fn init_registry(&mut self) -> Result<Arc<dyn Registry>> {
        let address: SocketAddr = self
            .config
            .registry
            .address
            .parse()
            .context("invalid registry address")?;

        if !self.config.registry.is_embedded() {
            self.health.registry = ComponentHealth::Healthy;
            tracing::info!(address = %address, "using external registry");
            let client: Arc<dyn Registry> = Arc::new(RegistryClient::new(
                address,
                self.config.timing.call_timeout(),
            ));
            return Ok(client);
        }

        let store = Arc::new(MemoryRegistry::new());
        let listener = RpcListener::new(address, self.shutdown_rx.clone());
        let socket = listener
            .bind()
            .await
            .with_context(|| format!("failed to bind registry on {}", address))?;
        let bound = socket.local_addr().context("registry socket has no address")?;

        let service = Arc::new(RegistryService::new(Arc::clone(&store)));
        self.tasks.push(tokio::spawn(async move {
            listener.serve(socket, service).await;
        }));

        self.registry_addr = Some(bound);
        self.health.registry = ComponentHealth::Healthy;
        tracing::info!(address = %bound, "embedded registry started");
        let registry: Arc<dyn Registry> = store;
        Ok(registry)
    }

    fn init_peer(&self, registry: Arc<dyn Registry>) -> Arc<Peer> {
        let transport = Arc::new(TcpTransport::new(
            registry,
            self.config.timing.call_timeout(),
        ));
        Peer::new(
            self.config.peer_id(),
            self.config.roster(),
            self.config.timing.clone(),
            transport,
        )
    }

    /// Bind the peer's RPC listener and publish its address.
    async fn start_listener(&mut self, peer: &Arc<Peer>, registry: &dyn Registry) -> Result<()> {
        let bind: SocketAddr = self
            .config
            .peer
            .bind
            .parse()
            .context("invalid peer bind address")?;

        let listener = RpcListener::new(bind, self.shutdown_rx.clone());
        let socket = listener
            .bind()
            .await
            .with_context(|| format!("failed to bind peer listener on {}", bind))?;
        let bound = advertised(socket.local_addr().context("peer socket has no address")?);

        let handler = Arc::clone(peer);
        self.tasks.push(tokio::spawn(async move {
            listener.serve(socket, handler).await;
        }));
        self.health.listener = ComponentHealth::Healthy;

        registry
            .register(peer.id(), bound)
            .await
            .with_context(|| format!("failed to register {} at {}", peer.id(), bound))?;

        self.rpc_addr = Some(bound);
        tracing::info!(peer = %peer.id(), address = %bound, "peer listening");
        Ok(())
    }

    fn start_detector(&mut self, peer: &Arc<Peer>) {
        let detector = FailureDetector::new(Arc::clone(peer));
        self.tasks.extend(detector.spawn(self.shutdown_rx.clone()));
        self.health.detector = ComponentHealth::Healthy;
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Start, then run until the front end built by `frontend` completes,
    /// Ctrl-C arrives, or shutdown is signalled.
    pub async fn run_with<F, Fut>(&mut self, frontend: F) -> Result<()>
    where
        F: FnOnce(Arc<Peer>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.start().await?;
        let peer = self
            .peer
            .clone()
            .context("runtime started without a peer")?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
            result = frontend(peer) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "front end failed");
                }
            }
        }

        self.stop().await
    }

    /// Stop all runtime components.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping peer runtime");
        self.running.store(false, Ordering::Release);
        self.health.listener = ComponentHealth::Stopping;
        self.health.detector = ComponentHealth::Stopping;

        let _ = self.shutdown_tx.send(true);

        if let (Some(registry), Some(peer)) = (&self.registry, &self.peer) {
            if let Err(e) = registry.remove(peer.id()).await {
                tracing::warn!(peer = %peer.id(), error = %e, "failed to deregister");
            }
        }

        let tasks = std::mem::take(&mut self.tasks);
        let joined = tokio::time::timeout(STOP_TIMEOUT, async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "background task panicked");
                }
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!("background tasks did not stop in time");
        }

        self.health.listener = ComponentHealth::Stopped;
        self.health.detector = ComponentHealth::Stopped;
        self.health.registry = ComponentHealth::Stopped;
        tracing::info!("peer runtime stopped");
        Ok(())
    }
}

/// The address other peers should dial. A wildcard bind is advertised as loopback.
fn advertised(bound: SocketAddr) -> SocketAddr {
    if bound.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
    } else {
        bound
    }
}
