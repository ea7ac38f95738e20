use crate::store::SeedError;
use thiserror::Error;

/// Errors that can occur during server operation.
#[derive(Error, Debug)]
pub enum TchatsError {
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Seed data could not be loaded.
    #[error("seed error: {0}")]
    Seed(#[from] SeedError),
    /// An outbound event could not be encoded.
    #[error("event error: {0}")]
    Event(#[from] tchat_common::event::EventError),
    /// Invalid runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// The session was already closed.
    #[error("connection closed")]
    ConnectionClosed,
}
