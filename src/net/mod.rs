//! Networking layer.
//!
//! - [`message`] - Wire messages for peer calls and the registry
//! - [`codec`] - Length-prefixed JSON framing
//! - [`server`] - TCP listener serving a frame handler
//! - [`transport`] - Outbound calls and the TCP transport
//! - [`registry`] - Name service: in-memory store, server, and client
//! - [`loopback`] - In-process transport for running peers side by side

pub mod codec;
pub mod loopback;
pub mod message;
pub mod registry;
pub mod server;
pub mod transport;
