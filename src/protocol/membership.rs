//! Active membership view.
//!
//! Tracks which roster peers are believed reachable and when each was last
//! heard from. Time is passed in by the caller so staleness is evaluated
//! against a single `now` per scan.

use super::state::PeerId;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Membership bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Membership {
    /// Peers currently believed reachable.
    active: BTreeSet<PeerId>,

    /// Last time any message arrived from a peer.
    last_contact: HashMap<PeerId, Instant>,
}

impl Membership {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `peer` to the active set with a fresh contact stamp.
    ///
    /// Returns true if the peer was not active before.
    pub fn admit(&mut self, peer: &PeerId, now: Instant) -> bool {
        self.touch(peer, now);
        self.active.insert(peer.clone())
    }

    /// Record contact from `peer` without changing the active set.
    pub fn touch(&mut self, peer: &PeerId, now: Instant) {
        self.last_contact.insert(peer.clone(), now);
    }

    /// Drop every trace of `peer`. Returns true if it was tracked at all.
    pub fn remove(&mut self, peer: &PeerId) -> bool {
        let was_active = self.active.remove(peer);
        let had_contact = self.last_contact.remove(peer).is_some();
        was_active || had_contact
    }

    /// Peers whose last contact is older than `timeout` at `now`.
    pub fn stale(&self, now: Instant, timeout: Duration) -> Vec<PeerId> {
        let mut stale: Vec<PeerId> = self
            .last_contact
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > timeout)
            .map(|(peer, _)| peer.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Roster peers (other than `local`) that are not currently active.
    pub fn missing_from(&self, roster: &[PeerId], local: &PeerId) -> Vec<PeerId> {
        roster
            .iter()
            .filter(|peer| *peer != local && !self.active.contains(*peer))
            .cloned()
            .collect()
    }

    /// Check whether `peer` is active.
    pub fn is_active(&self, peer: &PeerId) -> bool {
        self.active.contains(peer)
    }

    /// Snapshot of the active set, in identity order.
    pub fn active(&self) -> Vec<PeerId> {
        self.active.iter().cloned().collect()
    }

    /// Last contact stamp for `peer`.
    pub fn last_contact(&self, peer: &PeerId) -> Option<Instant> {
        self.last_contact.get(peer).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str) -> PeerId {
        PeerId::from(name)
    }

    #[test]
    fn test_admit_and_remove() {
        let now = Instant::now();
        let mut view = Membership::new();

        assert!(view.admit(&peer("B"), now));
        assert!(!view.admit(&peer("B"), now));
        assert!(view.is_active(&peer("B")));

        assert!(view.remove(&peer("B")));
        assert!(!view.is_active(&peer("B")));
        assert!(view.last_contact(&peer("B")).is_none());
        assert!(!view.remove(&peer("B")));
    }

    #[test]
    fn test_touch_does_not_activate() {
        let now = Instant::now();
        let mut view = Membership::new();
        view.touch(&peer("C"), now);

        assert!(!view.is_active(&peer("C")));
        assert_eq!(view.last_contact(&peer("C")), Some(now));
    }

    #[test]
    fn test_stale_uses_strict_threshold() {
        let start = Instant::now();
        let timeout = Duration::from_secs(5);
        let mut view = Membership::new();
        view.admit(&peer("B"), start);
        view.admit(&peer("C"), start + Duration::from_secs(3));

        assert!(view.stale(start + timeout, timeout).is_empty());
        assert_eq!(
            view.stale(start + Duration::from_secs(6), timeout),
            vec![peer("B")]
        );
        assert_eq!(
            view.stale(start + Duration::from_secs(9), timeout),
            vec![peer("B"), peer("C")]
        );
    }

    #[test]
    fn test_missing_from_roster() {
        let now = Instant::now();
        let roster = vec![peer("A"), peer("B"), peer("C")];
        let mut view = Membership::new();
        view.admit(&peer("C"), now);

        assert_eq!(view.missing_from(&roster, &peer("A")), vec![peer("B")]);
    }
}
