//! tchat room admission server: authenticates WebSocket sessions and
//! attaches them to the chat room they ask for.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Token and room checks run once per connection.
pub mod admission;
/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for server operations.
pub mod error;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
/// Room → active sessions registry.
pub mod registry;
/// Accept loop and shared server state.
pub mod server;
/// Token and room stores.
pub mod store;

pub use admission::{AdmissionGate, Decision, GateConfig, Session};
pub use server::{run, run_with_shutdown, ServerState};
