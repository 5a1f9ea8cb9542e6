//! Inbound RPC server.
//!
//! A shared TCP listener for both the peer RPC surface and the registry
//! service. Each accepted connection is served on its own task: frames are
//! read, handed to a [`FrameHandler`], and answered in order until the client
//! closes the connection.

use super::codec::{read_frame, write_frame};
use crate::core::error::PeerResult;
use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::watch;

/// Handles decoded request frames.
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    /// The request type decoded from the wire.
    type Request: DeserializeOwned + Send;

    /// The response type encoded to the wire.
    type Response: Serialize + Send + Sync;

    /// Answer one request.
    async fn handle(&self, request: Self::Request) -> Self::Response;

    /// Service name for logs.
    fn service_name(&self) -> &'static str;
}

/// Listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not yet started.
    Created,
    /// Accepting connections.
    Listening,
    /// Stopped.
    Stopped,
}

/// Listener metrics.
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,

    /// Currently open connections.
    pub connections_active: AtomicU64,

    /// Frames answered.
    pub frames_handled: AtomicU64,

    /// Connections dropped on a malformed frame.
    pub frames_rejected: AtomicU64,
}

impl ListenerMetrics {
    fn connection_accepted(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get active connection count.
    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }

    /// Get answered frame count.
    pub fn handled(&self) -> u64 {
        self.frames_handled.load(Ordering::Relaxed)
    }
}

/// TCP listener serving one [`FrameHandler`].
pub struct RpcListener {
    /// Requested bind address.
    bind_addr: SocketAddr,

    /// Current state.
    state: RwLock<ListenerState>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Metrics.
    metrics: Arc<ListenerMetrics>,
}

impl RpcListener {
    /// Create a listener.
    pub fn new(bind_addr: SocketAddr, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            bind_addr,
            state: RwLock::new(ListenerState::Created),
            shutdown_rx,
            metrics: Arc::new(ListenerMetrics::default()),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ListenerState {
        *self.state.read()
    }

    /// Get metrics.
    pub fn metrics(&self) -> &Arc<ListenerMetrics> {
        &self.metrics
    }

    /// Bind the socket. The returned listener reports the resolved address.
    pub async fn bind(&self) -> PeerResult<TokioTcpListener> {
        let listener = TokioTcpListener::bind(self.bind_addr).await?;
        *self.state.write() = ListenerState::Listening;
        Ok(listener)
    }

    /// Accept and serve connections until shutdown is signalled.
    pub async fn serve<H: FrameHandler>(&self, listener: TokioTcpListener, handler: Arc<H>) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let local_addr = listener.local_addr().ok();
        tracing::info!(
            service = handler.service_name(),
            addr = ?local_addr,
            "listener accepting connections"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let _ = stream.set_nodelay(true);
                            self.metrics.connection_accepted();

                            let handler = Arc::clone(&handler);
                            let metrics = Arc::clone(&self.metrics);
                            tokio::spawn(async move {
                                serve_connection(stream, remote_addr, handler, &metrics).await;
                                metrics.connection_closed();
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        *self.state.write() = ListenerState::Stopped;
        tracing::debug!(service = handler.service_name(), "listener stopped");
    }
}

async fn serve_connection<H: FrameHandler>(
    mut stream: TcpStream,
    remote_addr: SocketAddr,
    handler: Arc<H>,
    metrics: &ListenerMetrics,
) {
    let mut buffer = BytesMut::with_capacity(1024);

    loop {
        let request = match read_frame::<H::Request, _>(&mut stream, &mut buffer).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                metrics.frames_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(remote = %remote_addr, error = %e, "dropping connection");
                return;
            }
        };

        let response = handler.handle(request).await;
        metrics.frames_handled.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = write_frame(&mut stream, &response).await {
            tracing::debug!(remote = %remote_addr, error = %e, "failed to write response");
            return;
        }
    }
}
