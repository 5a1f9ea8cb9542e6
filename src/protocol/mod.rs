//! Mutual-exclusion protocol.
//!
//! - [`state`] - Identities, phases, and the per-peer state record
//! - [`queue`] - Deferred reply queue
//! - [`membership`] - Active peer set and last-contact tracking
//! - [`engine`] - Pure state transitions for request, reply, and eviction
//! - [`peer`] - Composition root wiring state to the transport
//! - [`detector`] - Heartbeat and failure-check background tasks

pub mod detector;
pub mod engine;
pub mod membership;
pub mod peer;
pub mod queue;
pub mod state;
