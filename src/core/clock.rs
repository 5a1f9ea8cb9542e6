//! Lamport logical clock.
//!
//! The clock provides the causal order that request timestamps are drawn
//! from. It is plain arithmetic: no I/O, no wall-clock reads.

use serde::{Deserialize, Serialize};

/// A monotonic Lamport counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    /// Create a clock at zero.
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Current value without advancing.
    pub const fn current(&self) -> u64 {
        self.value
    }

    /// Advance for a purely local event.
    pub fn tick(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Merge a timestamp observed on a received message.
    pub fn advance(&mut self, observed: u64) -> u64 {
        self.value = self.value.max(observed) + 1;
        self.value
    }
}

impl std::fmt::Display for LamportClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}
