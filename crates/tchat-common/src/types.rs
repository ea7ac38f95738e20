//! Core type definitions and protocol constants for tchat.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current WebSocket subprotocol identifier.
/// Bump this on breaking changes to the event envelope.
pub const PROTOCOL_VERSION: &str = "tchat.v1";

/// Server-assigned identifier for one live connection.
pub type SessionId = u64;

/// Event names used in the `event` field of the JSON envelope.
pub mod event_name {
    /// Admission rejected; carries an error code.
    pub const ERROR: &str = "error";
    /// Admission granted; carries the joined room id.
    pub const JOINED: &str = "joined";
}

/// Stable identifier of a user. Identity is by string equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Stable identifier of a chat room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(UserId);
string_id!(RoomId);
