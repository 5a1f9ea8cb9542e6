//! Request/reply state transitions.
//!
//! Every transition here is synchronous and performs no I/O. The caller holds
//! the peer lock, applies one transition, releases the lock, and only then
//! performs the sends the transition asked for. This keeps inbound RPC
//! handling from ever waiting on network latency.
//!
//! # State machine
//!
//! ```text
//! RELEASED --begin_request--> WANTED --try_enter (no pending)--> HELD
//!     ^                         |                                 |
//!     +------abort_request------+                                 |
//!     +----------------------------release------------------------+
//! ```

use super::state::{PeerId, PeerState, Phase, RequestStamp};
use crate::core::error::{PeerError, PeerResult};
use std::time::Duration;
use tokio::time::Instant;

/// An issued request: its timestamp and the recipients snapshotted at issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub timestamp: u64,
    pub recipients: Vec<PeerId>,
}

/// How an incoming request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Reply now.
    Grant,
    /// Queued until release.
    Defer,
}

impl PeerState {
    /// RELEASED -> WANTED.
    ///
    /// Ticks the clock and snapshots the active set as both the recipient
    /// list and the initial pending set. Peers that appear later are not
    /// awaited for this request.
    pub fn begin_request(&mut self) -> PeerResult<RequestTicket> {
        if self.phase != Phase::Released {
            return Err(PeerError::invalid_transition("request", self.phase));
        }

        let timestamp = self.clock.tick();
        let recipients = self.membership.active();

        self.phase = Phase::Wanted;
        self.request_timestamp = Some(timestamp);
        self.pending_replies = recipients.iter().cloned().collect();

        Ok(RequestTicket {
            timestamp,
            recipients,
        })
    }

    /// Whether the outstanding local request precedes an incoming one.
    pub fn local_has_priority(&self, requester: &PeerId, timestamp: u64) -> bool {
        match (self.phase, self.local_stamp()) {
            (Phase::Wanted, Some(local)) => local < RequestStamp::new(timestamp, requester.clone()),
            _ => false,
        }
    }

    /// React to `REQUEST(requester, timestamp)`.
    pub fn on_request(
        &mut self,
        requester: &PeerId,
        timestamp: u64,
        now: Instant,
    ) -> RequestDecision {
        self.clock.advance(timestamp);
        self.membership.touch(requester, now);

        if self.phase == Phase::Held || self.local_has_priority(requester, timestamp) {
            self.deferred.append(requester.clone());
            RequestDecision::Defer
        } else {
            RequestDecision::Grant
        }
    }

    /// React to `REPLY(responder)`. Returns true if it was awaited.
    pub fn on_reply(&mut self, responder: &PeerId, now: Instant) -> bool {
        self.membership.touch(responder, now);
        self.pending_replies.remove(responder)
    }

    /// React to `HEARTBEAT(sender)`. Returns true if the sender was rediscovered.
    pub fn on_heartbeat(&mut self, sender: &PeerId, now: Instant) -> bool {
        self.membership.admit(sender, now)
    }

    /// WANTED -> HELD, once every awaited reply is in.
    ///
    /// `timestamp` ties the transition to the request that is waiting, so an
    /// outdated waiter cannot enter on behalf of a newer request.
    pub fn try_enter(&mut self, timestamp: u64) -> bool {
        if self.phase == Phase::Wanted
            && self.request_timestamp == Some(timestamp)
            && self.pending_replies.is_empty()
        {
            self.phase = Phase::Held;
            true
        } else {
            false
        }
    }

    /// Whether the request stamped `timestamp` is still waiting.
    pub fn is_waiting(&self, timestamp: u64) -> bool {
        self.phase == Phase::Wanted && self.request_timestamp == Some(timestamp)
    }

    /// Whether the hold obtained by the request stamped `timestamp` is current.
    pub fn is_holding(&self, timestamp: u64) -> bool {
        self.phase == Phase::Held && self.request_timestamp == Some(timestamp)
    }

    /// WANTED -> RELEASED after the grant wait ran out.
    ///
    /// Also drains the deferred queue: a peer that no longer wants the
    /// resource must answer the requests it was holding back.
    pub fn abort_request(&mut self, timestamp: u64) -> Option<Vec<PeerId>> {
        if !self.is_waiting(timestamp) {
            return None;
        }

        self.phase = Phase::Released;
        self.request_timestamp = None;
        self.pending_replies.clear();
        Some(self.deferred.drain())
    }

    /// HELD -> RELEASED. Returns the drained requesters to answer, in order.
    pub fn release(&mut self) -> PeerResult<Vec<PeerId>> {
        if self.phase != Phase::Held {
            return Err(PeerError::invalid_transition("release", self.phase));
        }

        self.phase = Phase::Released;
        self.request_timestamp = None;
        Ok(self.deferred.drain())
    }

    /// Remove every trace of `peer`. Returns true if anything changed.
    pub fn evict(&mut self, peer: &PeerId) -> bool {
        let tracked = self.membership.remove(peer);
        let was_pending = self.pending_replies.remove(peer);
        let dequeued = self.deferred.remove_all(peer);
        tracked || was_pending || dequeued > 0
    }

    /// Diagnostic view for `list`.
    pub fn snapshot(&self, now: Instant) -> PeerSnapshot {
        PeerSnapshot {
            id: self.id.clone(),
            phase: self.phase,
            clock: self.clock.current(),
            request_timestamp: self.request_timestamp,
            pending: self.pending_replies.iter().cloned().collect(),
            deferred: self.deferred.iter().cloned().collect(),
            active: self
                .membership
                .active()
                .into_iter()
                .map(|peer| {
                    let since = self
                        .membership
                        .last_contact(&peer)
                        .map(|seen| now.saturating_duration_since(seen));
                    (peer, since)
                })
                .collect(),
        }
    }
}

/// Point-in-time copy of a peer's state.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub id: PeerId,
    pub phase: Phase,
    pub clock: u64,
    pub request_timestamp: Option<u64>,
    pub pending: Vec<PeerId>,
    pub deferred: Vec<PeerId>,
    /// Active peers with time since last contact.
    pub active: Vec<(PeerId, Option<Duration>)>,
}

impl std::fmt::Display for PeerSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "--- {} ---", self.id)?;
        writeln!(f, "State:             {}", self.phase)?;
        writeln!(f, "Logical clock:     {}", self.clock)?;
        match self.request_timestamp {
            Some(timestamp) => writeln!(f, "Request timestamp: {}", timestamp)?,
            None => writeln!(f, "Request timestamp: -")?,
        }
        if !self.pending.is_empty() {
            writeln!(f, "Awaiting replies:  {}", join(&self.pending))?;
        }
        if !self.deferred.is_empty() {
            writeln!(f, "Deferred:          {}", join(&self.deferred))?;
        }
        if self.active.is_empty() {
            writeln!(f, "No active peers known.")?;
        } else {
            writeln!(f, "Active peers:")?;
            for (peer, since) in &self.active {
                match since {
                    Some(since) => {
                        writeln!(f, "  - {} (seen {:.1}s ago)", peer, since.as_secs_f64())?
                    }
                    None => writeln!(f, "  - {}", peer)?,
                }
            }
        }
        Ok(())
    }
}

fn join(peers: &[PeerId]) -> String {
    peers
        .iter()
        .map(PeerId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str) -> PeerId {
        PeerId::from(name)
    }

    fn state_with(id: &str, active: &[&str]) -> PeerState {
        let now = Instant::now();
        let mut state = PeerState::new(peer(id));
        for name in active {
            state.membership.admit(&peer(name), now);
        }
        state
    }

    fn assert_timestamp_invariant(state: &PeerState) {
        assert_eq!(
            state.request_timestamp.is_none(),
            state.phase == Phase::Released
        );
    }

    #[test]
    fn test_begin_request_snapshots_active_peers() {
        let mut state = state_with("A", &["B", "C"]);
        let ticket = state.begin_request().unwrap();

        assert_eq!(ticket.timestamp, 1);
        assert_eq!(ticket.recipients, vec![peer("B"), peer("C")]);
        assert_eq!(state.phase, Phase::Wanted);
        assert_eq!(state.pending_replies.len(), 2);
        assert_timestamp_invariant(&state);
    }

    #[test]
    fn test_begin_request_rejected_unless_released() {
        let mut state = state_with("A", &[]);
        state.begin_request().unwrap();

        let err = state.begin_request().unwrap_err();
        assert!(matches!(
            err,
            PeerError::InvalidTransition {
                phase: Phase::Wanted,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_recipient_set_enters_immediately() {
        let mut state = state_with("A", &[]);
        let ticket = state.begin_request().unwrap();

        assert!(ticket.recipients.is_empty());
        assert!(state.try_enter(ticket.timestamp));
        assert_eq!(state.phase, Phase::Held);
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_identity() {
        let now = Instant::now();
        let mut a = state_with("A", &["B"]);
        let mut b = state_with("B", &["A"]);
        a.clock.advance(3);
        b.clock.advance(3);

        let ticket_a = a.begin_request().unwrap();
        let ticket_b = b.begin_request().unwrap();
        assert_eq!(ticket_a.timestamp, 5);
        assert_eq!(ticket_b.timestamp, 5);

        // B sees A's request: (5, A) < (5, B), so B must grant.
        assert_eq!(b.on_request(&peer("A"), 5, now), RequestDecision::Grant);
        // A sees B's request: A's own request wins, so A defers.
        assert_eq!(a.on_request(&peer("B"), 5, now), RequestDecision::Defer);

        assert!(a.on_reply(&peer("B"), now));
        assert!(a.try_enter(ticket_a.timestamp));
        assert!(!b.try_enter(ticket_b.timestamp));
        assert!(a.deferred.contains(&peer("B")));
    }

    #[test]
    fn test_smaller_timestamp_wins_regardless_of_identity() {
        let now = Instant::now();
        let mut z = state_with("Z", &["A"]);
        z.begin_request().unwrap(); // (1, Z)

        assert_eq!(z.on_request(&peer("A"), 7, now), RequestDecision::Defer);
        assert_eq!(z.deferred.len(), 1);
    }

    #[test]
    fn test_held_defers_and_released_grants() {
        let now = Instant::now();
        let mut state = state_with("C", &[]);
        assert_eq!(state.on_request(&peer("D"), 1, now), RequestDecision::Grant);

        let ticket = state.begin_request().unwrap();
        assert!(state.try_enter(ticket.timestamp));
        assert_eq!(state.on_request(&peer("D"), 1, now), RequestDecision::Defer);
        assert_eq!(state.on_request(&peer("E"), 0, now), RequestDecision::Defer);

        let drained = state.release().unwrap();
        assert_eq!(drained, vec![peer("D"), peer("E")]);
        assert!(state.deferred.is_empty());
        assert_timestamp_invariant(&state);
    }

    #[test]
    fn test_on_request_advances_clock() {
        let now = Instant::now();
        let mut state = state_with("A", &[]);
        state.on_request(&peer("B"), 41, now);
        assert_eq!(state.clock.current(), 42);
        assert!(state.membership.last_contact(&peer("B")).is_some());
    }

    #[test]
    fn test_release_requires_held() {
        let mut state = state_with("A", &["B"]);
        assert!(state.release().is_err());

        state.begin_request().unwrap();
        assert!(state.release().is_err());
        assert_eq!(state.phase, Phase::Wanted);
    }

    #[test]
    fn test_evict_clears_all_traces() {
        let now = Instant::now();
        let mut state = state_with("A", &["B", "C"]);
        state.begin_request().unwrap();
        state.on_request(&peer("B"), 9, now);
        assert!(state.deferred.contains(&peer("B")));

        assert!(state.evict(&peer("B")));
        assert!(!state.membership.is_active(&peer("B")));
        assert!(state.membership.last_contact(&peer("B")).is_none());
        assert!(!state.pending_replies.contains(&peer("B")));
        assert!(!state.deferred.contains(&peer("B")));

        // Idempotent.
        assert!(!state.evict(&peer("B")));
    }

    #[test]
    fn test_evicting_last_pending_peer_unblocks_entry() {
        let mut state = state_with("G", &["F"]);
        let ticket = state.begin_request().unwrap();
        assert!(!state.try_enter(ticket.timestamp));

        state.evict(&peer("F"));
        assert!(state.try_enter(ticket.timestamp));
    }

    #[test]
    fn test_abort_request_reverts_and_drains() {
        let now = Instant::now();
        let mut state = state_with("A", &["B", "C"]);
        let ticket = state.begin_request().unwrap();
        state.on_request(&peer("C"), 50, now);

        assert!(state.abort_request(ticket.timestamp + 1).is_none());
        let drained = state.abort_request(ticket.timestamp).unwrap();

        assert_eq!(drained, vec![peer("C")]);
        assert_eq!(state.phase, Phase::Released);
        assert!(state.pending_replies.is_empty());
        assert_timestamp_invariant(&state);
    }

    #[test]
    fn test_heartbeat_rediscovers() {
        let now = Instant::now();
        let mut state = state_with("A", &[]);
        assert!(state.on_heartbeat(&peer("B"), now));
        assert!(!state.on_heartbeat(&peer("B"), now));
        assert!(state.membership.is_active(&peer("B")));
    }

    #[test]
    fn test_snapshot_display() {
        let mut state = state_with("A", &["B"]);
        state.begin_request().unwrap();

        let rendered = state.snapshot(Instant::now()).to_string();
        assert!(rendered.contains("WANTED"));
        assert!(rendered.contains("Awaiting replies:  B"));
        assert!(rendered.contains("  - B (seen"));
    }
}
