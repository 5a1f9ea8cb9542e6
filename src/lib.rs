//! Peerlock - decentralized mutual exclusion over a peer roster.
//!
//! A fixed roster of peers coordinates exclusive access to one shared resource
//! without a central coordinator, using the Ricart–Agrawala algorithm. Lamport
//! clocks order requests, a deferred queue holds grants owed by the current
//! holder or a higher-priority requester, and a heartbeat failure detector
//! evicts peers that stop answering so nobody waits on them forever.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Console / CLI front end                      │
//! │               request │ release │ list │ quit                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Peer                                   │
//! │   Request/Reply engine │ Deferred queue │ Failure detector      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Transport                                │
//! │        TCP + length-prefixed JSON │ Registry │ Loopback         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::clock`] - Lamport logical clock
//! - [`core::error`] - Error types
//! - [`core::runtime`] - Process orchestration
//!
//! ## Protocol
//! - [`protocol::state`] - Identities, phases, per-peer state
//! - [`protocol::queue`] - Deferred reply queue
//! - [`protocol::membership`] - Active peer set
//! - [`protocol::engine`] - State transitions
//! - [`protocol::peer`] - Composition root
//! - [`protocol::detector`] - Heartbeat and failure checks
//!
//! ## Networking
//! - [`net::message`] - Wire messages
//! - [`net::codec`] - Framing
//! - [`net::server`] - RPC listener
//! - [`net::transport`] - Outbound calls
//! - [`net::registry`] - Name service
//! - [`net::loopback`] - In-process transport
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//! - [`cli::console`] - Interactive console
//!
//! # Key Invariants
//!
//! - At most one peer is `HELD` at a time among peers that can reach each other.
//! - A request timestamp is set exactly while the peer is `WANTED` or `HELD`.
//! - Requests are ordered by `(timestamp, peer)`; the smaller stamp wins.
//! - Deferred requesters are answered in arrival order on release.
//! - An evicted peer leaves no trace in membership, awaited replies, or the queue.

// Core infrastructure
pub mod core;

// Mutual-exclusion protocol
pub mod protocol;

// Networking
pub mod net;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{clock, config, error, runtime};
pub use protocol::peer::Peer;
pub use protocol::state::{PeerId, Phase};
