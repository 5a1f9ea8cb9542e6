//! Peer composition root.
//!
//! A [`Peer`] owns the protocol state of one process behind a single lock,
//! exposes the remote-callable operations other peers invoke, and the local
//! operations the console invokes. All sends happen with the lock released.
//!
//! Failures never escape a `Peer` method. An unreachable target is evicted,
//! an invalid transition is logged and ignored, and a grant that never
//! completes reverts the peer to `RELEASED`.

use super::engine::{PeerSnapshot, RequestDecision, RequestTicket};
use super::state::{PeerId, PeerState, Phase};
use crate::core::config::TimingConfig;
use crate::core::error::PeerError;
use crate::net::message::{Rpc, RpcResponse};
use crate::net::server::FrameHandler;
use crate::net::transport::{CallOutcome, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// One participant in the mutual-exclusion protocol.
pub struct Peer {
    /// This peer's identity.
    id: PeerId,

    /// Every identity that may participate, including this one.
    roster: Vec<PeerId>,

    /// Timing constants.
    timing: TimingConfig,

    /// Protocol state. Never held across an await.
    state: Mutex<PeerState>,

    /// Signalled whenever `pending_replies` shrinks.
    grant_signal: Notify,

    /// Outbound calls.
    transport: Arc<dyn Transport>,
}

impl Peer {
    /// Create a peer in the startup state.
    pub fn new(
        id: PeerId,
        roster: Vec<PeerId>,
        timing: TimingConfig,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        tracing::info!(peer = %id, "peer initialized, state RELEASED");
        Arc::new(Self {
            state: Mutex::new(PeerState::new(id.clone())),
            id,
            roster,
            timing,
            grant_signal: Notify::new(),
            transport,
        })
    }

    /// This peer's identity.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// The static roster.
    pub fn roster(&self) -> &[PeerId] {
        &self.roster
    }

    /// Timing constants.
    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Run `f` against the state under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&PeerState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Diagnostic dump of state, clock, and membership.
    pub fn list_peers(&self) -> PeerSnapshot {
        self.state.lock().snapshot(Instant::now())
    }

    // ------------------------------------------------------------------
    // Remote-callable surface
    // ------------------------------------------------------------------

    /// Handle `REQUEST(requester, timestamp)`.
    ///
    /// Returns true if the grant was sent immediately, false if deferred.
    pub async fn receive_request(&self, requester: &PeerId, timestamp: u64) -> bool {
        let decision = {
            let mut state = self.state.lock();
            state.on_request(requester, timestamp, Instant::now())
        };

        match decision {
            RequestDecision::Defer => {
                tracing::debug!(peer = %self.id, requester = %requester, timestamp, "request deferred");
                false
            }
            RequestDecision::Grant => {
                tracing::debug!(peer = %self.id, requester = %requester, timestamp, "granting request");
                self.send_reply(requester).await;
                true
            }
        }
    }

    /// Handle `REPLY(responder)`.
    pub fn receive_reply(&self, responder: &PeerId) -> bool {
        let (awaited, remaining) = {
            let mut state = self.state.lock();
            let awaited = state.on_reply(responder, Instant::now());
            (awaited, state.pending_replies.len())
        };

        if awaited {
            tracing::info!(peer = %self.id, responder = %responder, remaining, "reply received");
            self.grant_signal.notify_one();
        }
        true
    }

    /// Handle `HEARTBEAT(sender)`.
    pub fn receive_heartbeat(&self, sender: &PeerId) -> bool {
        let rediscovered = self.state.lock().on_heartbeat(sender, Instant::now());
        if rediscovered {
            tracing::info!(peer = %self.id, sender = %sender, "peer rediscovered by heartbeat");
        }
        true
    }

    /// Route an inbound RPC to its handler.
    pub async fn dispatch(&self, rpc: Rpc) -> RpcResponse {
        let accepted = match rpc {
            Rpc::Request {
                requester,
                timestamp,
            } => self.receive_request(&requester, timestamp).await,
            Rpc::Reply { responder } => self.receive_reply(&responder),
            Rpc::Heartbeat { sender } => self.receive_heartbeat(&sender),
        };
        RpcResponse { accepted }
    }

    // ------------------------------------------------------------------
    // Request / reply protocol
    // ------------------------------------------------------------------

    /// Issue a request to every active peer and start waiting for the grant.
    ///
    /// Returns `None` (and does nothing) unless the peer is `RELEASED`.
    pub async fn issue_request(self: &Arc<Self>) -> Option<RequestTicket> {
        let ticket = {
            let mut state = self.state.lock();
            match state.begin_request() {
                Ok(ticket) => ticket,
                Err(e) => {
                    tracing::warn!(peer = %self.id, error = %e, "request ignored");
                    return None;
                }
            }
        };

        tracing::info!(
            peer = %self.id,
            timestamp = ticket.timestamp,
            recipients = ?ticket.recipients,
            "state changed to WANTED"
        );
        if ticket.recipients.is_empty() {
            tracing::info!(peer = %self.id, "no other active peers, entering directly");
        }

        for recipient in &ticket.recipients {
            let rpc = Rpc::Request {
                requester: self.id.clone(),
                timestamp: ticket.timestamp,
            };
            match self.transport.call(recipient, rpc).await {
                CallOutcome::Delivered(granted) => {
                    tracing::debug!(peer = %self.id, recipient = %recipient, granted, "request delivered");
                }
                CallOutcome::Unreachable(reason) => {
                    tracing::warn!(peer = %self.id, recipient = %recipient, %reason, "request not delivered");
                    self.evict(recipient);
                }
            }
        }

        let waiter = Arc::clone(self);
        let waiting = ticket.clone();
        tokio::spawn(async move {
            waiter.await_grant(waiting).await;
        });

        Some(ticket)
    }

    /// Wait until every awaited reply is in, then enter the critical section.
    ///
    /// Bounded by the grant-wait timeout; on expiry the request is abandoned
    /// and the peer reverts to `RELEASED`. Returns true if the peer entered.
    pub async fn await_grant(self: Arc<Self>, ticket: RequestTicket) -> bool {
        let started = Instant::now();
        let deadline = started + self.timing.grant_wait(ticket.recipients.len());

        loop {
            let outcome = {
                let mut state = self.state.lock();
                if state.try_enter(ticket.timestamp) {
                    Some(true)
                } else if !state.is_waiting(ticket.timestamp) {
                    Some(false)
                } else {
                    None
                }
            };

            match outcome {
                Some(true) => {
                    tracing::info!(
                        peer = %self.id,
                        timestamp = ticket.timestamp,
                        hold = ?self.timing.hold(),
                        "permission granted, entering critical section"
                    );
                    self.schedule_release(ticket.timestamp);
                    return true;
                }
                Some(false) => return false,
                None => {}
            }

            if Instant::now() >= deadline {
                break;
            }
            // A timeout just loops back for one last check before aborting.
            let _ = tokio::time::timeout_at(deadline, self.grant_signal.notified()).await;
        }

        self.abort_request(ticket.timestamp, started.elapsed()).await;
        false
    }

    /// Release the critical section and answer every deferred requester.
    pub async fn release_resource(&self) -> bool {
        self.release_hold(None).await
    }

    /// Remove every trace of `peer`. Idempotent.
    pub fn evict(&self, peer: &PeerId) -> bool {
        let changed = self.state.lock().evict(peer);
        if changed {
            tracing::warn!(peer = %self.id, failed = %peer, "marking peer as failed");
            self.grant_signal.notify_one();
        }
        changed
    }

    fn schedule_release(self: &Arc<Self>, timestamp: u64) {
        let peer = Arc::clone(self);
        let hold = self.timing.hold();
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            peer.release_hold(Some(timestamp)).await;
        });
    }

    /// Release the current hold. With `Some(timestamp)` only the hold
    /// obtained by that request is released, and a mismatch is silent.
    async fn release_hold(&self, timestamp: Option<u64>) -> bool {
        let drained = {
            let mut state = self.state.lock();
            if let Some(timestamp) = timestamp {
                if !state.is_holding(timestamp) {
                    return false;
                }
            }
            match state.release() {
                Ok(drained) => drained,
                Err(e) => {
                    tracing::warn!(peer = %self.id, error = %e, "release ignored");
                    return false;
                }
            }
        };

        tracing::info!(
            peer = %self.id,
            deferred = ?drained,
            "leaving critical section, state RELEASED"
        );
        self.reply_all(&drained).await;
        true
    }

    async fn abort_request(&self, timestamp: u64, waited: Duration) {
        let (drained, pending) = {
            let mut state = self.state.lock();
            let pending = state.pending_replies.len();
            match state.abort_request(timestamp) {
                Some(drained) => (drained, pending),
                None => return,
            }
        };

        let err = PeerError::LivenessTimeout {
            waited_ms: waited.as_millis() as u64,
            pending,
        };
        tracing::warn!(peer = %self.id, error = %err, "giving up on request, state RELEASED");
        self.reply_all(&drained).await;
    }

    async fn reply_all(&self, requesters: &[PeerId]) {
        for requester in requesters {
            self.send_reply(requester).await;
        }
    }

    async fn send_reply(&self, target: &PeerId) {
        let rpc = Rpc::Reply {
            responder: self.id.clone(),
        };
        if let CallOutcome::Unreachable(reason) = self.transport.call(target, rpc).await {
            tracing::warn!(peer = %self.id, target = %target, %reason, "reply not delivered");
            self.evict(target);
        }
    }

    // ------------------------------------------------------------------
    // Failure detection
    // ------------------------------------------------------------------

    /// Send a heartbeat to every active peer, evicting those that fail.
    pub async fn send_heartbeats(&self) {
        let targets = self.state.lock().membership.active();
        for target in targets {
            let rpc = Rpc::Heartbeat {
                sender: self.id.clone(),
            };
            if let CallOutcome::Unreachable(reason) = self.transport.call(&target, rpc).await {
                tracing::debug!(peer = %self.id, target = %target, %reason, "heartbeat not delivered");
                self.evict(&target);
            }
        }
    }

    /// Evict peers silent past the staleness timeout, then rediscover.
    pub async fn check_failed_peers(&self) {
        let timeout = self.timing.heartbeat_timeout();
        let stale = self.state.lock().membership.stale(Instant::now(), timeout);
        for peer in stale {
            tracing::debug!(peer = %self.id, stale = %peer, ?timeout, "no contact within timeout");
            self.evict(&peer);
        }
        self.rediscover().await;
    }

    /// Probe every roster peer not currently active. Returns the peers added.
    pub async fn rediscover(&self) -> Vec<PeerId> {
        let missing = self
            .state
            .lock()
            .membership
            .missing_from(&self.roster, &self.id);

        let mut found = Vec::new();
        for candidate in missing {
            match self.transport.probe(&candidate).await {
                Ok(()) => {
                    let admitted = self
                        .state
                        .lock()
                        .membership
                        .admit(&candidate, Instant::now());
                    if admitted {
                        tracing::info!(peer = %self.id, found = %candidate, "connected to peer");
                        found.push(candidate);
                    }
                }
                Err(PeerError::NotFound { .. }) => {}
                Err(e) => {
                    tracing::info!(peer = %self.id, candidate = %candidate, error = %e, "found peer but could not connect");
                }
            }
        }
        found
    }

    // ------------------------------------------------------------------
    // Local surface
    // ------------------------------------------------------------------

    /// Console `request`: refresh membership, then issue a request.
    pub async fn request_resource(self: &Arc<Self>) -> Option<RequestTicket> {
        let phase = self.phase();
        if phase != Phase::Released {
            tracing::warn!(peer = %self.id, %phase, "invalid action, already requesting or holding");
            return None;
        }
        self.rediscover().await;
        self.issue_request().await
    }
}

#[async_trait]
impl FrameHandler for Peer {
    type Request = Rpc;
    type Response = RpcResponse;

    async fn handle(&self, request: Rpc) -> RpcResponse {
        self.dispatch(request).await
    }

    fn service_name(&self) -> &'static str {
        "peer"
    }
}
