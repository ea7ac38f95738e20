//! Common types shared by the tchat server and its clients.
//!
//! This crate provides:
//! - Identifier newtypes and protocol constants ([`types`])
//! - JSON event envelopes sent from server to client ([`event`])
//! - Session token format helpers ([`token`])
//! - Connection request parsing and client URL building ([`handshake`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event;
pub mod handshake;
pub mod token;
pub mod types;

pub use event::{ErrorCode, ServerEvent};
pub use handshake::Handshake;
pub use types::{RoomId, SessionId, UserId};
