//! Server-to-client event envelope.
//!
//! Every event is a single WebSocket text frame holding a JSON object with
//! an `event` name and a `data` payload:
//!
//! ```text
//! {"event":"joined","data":{"room":"R1"}}
//! {"event":"error","data":{"errorCode":"InvalidToken"}}
//! ```

use crate::types::RoomId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes carried by `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Token absent, malformed, unresolvable or not authorized for the room.
    InvalidToken,
    /// The requested room does not exist.
    NotFound,
    /// A backing store did not answer within the lookup timeout.
    Timeout,
    /// A backing store reported a failure.
    Unavailable,
}

impl ErrorCode {
    /// Wire name of the code, also used as a metrics label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "InvalidToken",
            Self::NotFound => "NotFound",
            Self::Timeout => "Timeout",
            Self::Unavailable => "Unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Why the session was rejected.
    pub error_code: ErrorCode,
}

/// Payload of a `joined` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedPayload {
    /// The room the session was attached to.
    pub room: RoomId,
}

/// An event emitted on a session.
///
/// Variants map 1:1 to the names in [`crate::types::event_name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Admission rejected.
    Error(ErrorPayload),
    /// Admission granted.
    Joined(JoinedPayload),
}

/// Errors that can occur while encoding or decoding an event.
#[derive(Debug, Error)]
pub enum EventError {
    /// The text was not a valid event envelope.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ServerEvent {
    /// Build an `error` event.
    #[must_use]
    pub fn error(code: ErrorCode) -> Self {
        Self::Error(ErrorPayload { error_code: code })
    }

    /// Build a `joined` event.
    #[must_use]
    pub fn joined(room: RoomId) -> Self {
        Self::Joined(JoinedPayload { room })
    }

    /// Event name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Error(_) => crate::types::event_name::ERROR,
            Self::Joined(_) => crate::types::event_name::JOINED,
        }
    }

    /// Encode to the JSON text sent in a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an event from a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] on unknown event names or payloads
    /// that do not match the event.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }
}
