//! Deferred request queue.

use super::state::PeerId;
use std::collections::VecDeque;

/// Requesters waiting for a reply until the local peer releases.
///
/// Replay order is insertion order, not priority order. No deduplication:
/// a requester cannot be queued twice while its own request is outstanding.
#[derive(Debug, Clone, Default)]
pub struct DeferredQueue {
    entries: VecDeque<PeerId>,
}

impl DeferredQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a requester.
    pub fn append(&mut self, peer: PeerId) {
        self.entries.push_back(peer);
    }

    /// Empty the queue, returning its contents in insertion order.
    pub fn drain(&mut self) -> Vec<PeerId> {
        self.entries.drain(..).collect()
    }

    /// Remove every occurrence of `peer`. Returns how many were removed.
    pub fn remove_all(&mut self, peer: &PeerId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|queued| queued != peer);
        before - self.entries.len()
    }

    /// Check whether `peer` is queued.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.entries.contains(peer)
    }

    /// Number of queued requesters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerId> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str) -> PeerId {
        PeerId::from(name)
    }

    #[test]
    fn test_drain_preserves_insertion_order() {
        let mut queue = DeferredQueue::new();
        queue.append(peer("E"));
        queue.append(peer("D"));
        queue.append(peer("F"));

        assert_eq!(queue.drain(), vec![peer("E"), peer("D"), peer("F")]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_remove_all() {
        let mut queue = DeferredQueue::new();
        queue.append(peer("D"));
        queue.append(peer("E"));
        queue.append(peer("D"));

        assert_eq!(queue.remove_all(&peer("D")), 2);
        assert!(!queue.contains(&peer("D")));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.remove_all(&peer("X")), 0);
    }
}
