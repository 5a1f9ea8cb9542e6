//! Background failure detection.
//!
//! Two periodic tasks per peer: one sends heartbeats to every active peer,
//! the other evicts peers silent past the staleness timeout and probes the
//! roster for peers that came (back) online. Both stop on the shutdown signal.

use super::peer::Peer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Heartbeat and failure-check loops for one peer.
pub struct FailureDetector {
    peer: Arc<Peer>,
}

impl FailureDetector {
    /// Create a detector for `peer`.
    pub fn new(peer: Arc<Peer>) -> Self {
        Self { peer }
    }

    /// Spawn both loops. They exit once `shutdown_rx` observes `true`.
    pub fn spawn(&self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let timing = self.peer.timing().clone();

        let heartbeat = {
            let peer = Arc::clone(&self.peer);
            run_periodic(
                "heartbeat",
                timing.heartbeat_interval(),
                shutdown_rx.clone(),
                move || {
                    let peer = Arc::clone(&peer);
                    async move { peer.send_heartbeats().await }
                },
            )
        };

        let failure_check = {
            let peer = Arc::clone(&self.peer);
            run_periodic(
                "failure-check",
                timing.failure_check_interval(),
                shutdown_rx,
                move || {
                    let peer = Arc::clone(&peer);
                    async move { peer.check_failed_peers().await }
                },
            )
        };

        vec![heartbeat, failure_check]
    }
}

fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::debug!(task = name, ?period, "background task started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => tick().await,
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(task = name, "background task stopped");
    })
}
