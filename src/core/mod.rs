//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`clock`] - Lamport logical clock
//! - [`error`] - Error types
//! - [`runtime`] - Process orchestration

pub mod clock;
pub mod config;
pub mod error;
pub mod runtime;
