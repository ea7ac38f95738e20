//! Room admission gate.
//!
//! Each connecting session presents an optional token and an optional room
//! id. The gate runs a fixed sequence of checks, stopping at the first one
//! that decides:
//!
//! 1. token absent → reject `InvalidToken`
//! 2. token fails format validation → silent (or `InvalidToken` when strict)
//! 3. token does not resolve → reject `InvalidToken`
//! 4. room absent → no-op, the session stays open without a room
//! 5. room unknown → reject `NotFound`
//! 6. resolved user has no id → reject `InvalidToken`
//! 7. user not a participant → reject `InvalidToken`
//! 8. admit: join the room, then emit `joined`
//!
//! Every store call is bounded by the lookup timeout. A timeout rejects with
//! `Timeout`, a store failure with `Unavailable`.

use crate::error::TchatsError;
use crate::metrics::{counters, histograms};
use crate::store::{RoomStore, StoreError, TokenStore, TokenValidator};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tchat_common::{ErrorCode, Handshake, RoomId, ServerEvent, SessionId, UserId};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Transport primitives the gate drives on a session.
#[async_trait]
pub trait Session: Send {
    /// Identifier used in logs.
    fn id(&self) -> SessionId;
    /// Attach the session to a room's channel.
    async fn join(&mut self, room: &RoomId) -> Result<(), TchatsError>;
    /// Send an event to the client.
    async fn emit(&mut self, event: ServerEvent) -> Result<(), TchatsError>;
    /// Close the session.
    async fn disconnect(&mut self) -> Result<(), TchatsError>;
}

/// Gate tuning.
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Upper bound on each store call.
    pub lookup_timeout: Duration,
    /// Reject tokens that fail format validation instead of leaving the
    /// session open and unrouted.
    pub strict_token_validation: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(2),
            strict_token_validation: false,
        }
    }
}

/// What the gate decided for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Session joins `room` as `user`.
    Admit {
        /// Requested room.
        room: RoomId,
        /// Resolved participant.
        user: UserId,
    },
    /// Session receives an `error` event and is closed.
    Reject(ErrorCode),
    /// Valid token but no room requested; the session stays open.
    Noop,
    /// Token failed format validation in lenient mode; nothing happens.
    Unvalidated,
}

impl Decision {
    /// Metrics and log label for this outcome.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Admit { .. } => "admitted",
            Self::Reject(_) => "rejected",
            Self::Noop => "noop",
            Self::Unvalidated => "unvalidated",
        }
    }

    /// Whether the session must be closed after the decision is applied.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reject(_))
    }
}

/// Decides whether a session may join the room it asks for.
///
/// Holds only read access to its stores, so one gate is shared by every
/// connection task without locking.
pub struct AdmissionGate {
    validator: Arc<dyn TokenValidator>,
    tokens: Arc<dyn TokenStore>,
    rooms: Arc<dyn RoomStore>,
    config: GateConfig,
}

impl AdmissionGate {
    /// Create a gate over the given collaborators.
    pub fn new(
        validator: Arc<dyn TokenValidator>,
        tokens: Arc<dyn TokenStore>,
        rooms: Arc<dyn RoomStore>,
        config: GateConfig,
    ) -> Self {
        Self {
            validator,
            tokens,
            rooms,
            config,
        }
    }

    /// The gate's configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the checks without touching any session.
    pub async fn decide(&self, handshake: &Handshake) -> Decision {
        let Some(token) = handshake.token.as_deref() else {
            return Decision::Reject(ErrorCode::InvalidToken);
        };

        match self
            .bounded("validate", self.validator.is_token_valid(token))
            .await
        {
            Ok(true) => {}
            Ok(false) if self.config.strict_token_validation => {
                return Decision::Reject(ErrorCode::InvalidToken);
            }
            Ok(false) => return Decision::Unvalidated,
            Err(code) => return Decision::Reject(code),
        }

        let record = match self
            .bounded("token", self.tokens.get_existing_token(token))
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return Decision::Reject(ErrorCode::InvalidToken),
            Err(code) => return Decision::Reject(code),
        };

        let Some(room_id) = handshake.room.as_deref().map(RoomId::from) else {
            return Decision::Noop;
        };

        let room = match self
            .bounded("room", self.rooms.find_room_by_id(&room_id))
            .await
        {
            Ok(Some(room)) => room,
            Ok(None) => return Decision::Reject(ErrorCode::NotFound),
            Err(code) => return Decision::Reject(code),
        };

        let Some(user) = record.user.id else {
            return Decision::Reject(ErrorCode::InvalidToken);
        };

        if !room.participants.contains(&user) {
            return Decision::Reject(ErrorCode::InvalidToken);
        }

        Decision::Admit {
            room: room_id,
            user,
        }
    }

    /// Decide, then apply the decision to `session`.
    ///
    /// A rejected session is always disconnected, even if emitting the
    /// error event failed.
    ///
    /// # Errors
    ///
    /// Returns the first transport error raised by the session.
    pub async fn admit<S>(
        &self,
        handshake: &Handshake,
        session: &mut S,
    ) -> Result<Decision, TchatsError>
    where
        S: Session + ?Sized,
    {
        let decision = self.decide(handshake).await;
        counters::admissions_total(decision.outcome());
        debug!(
            session = session.id(),
            room = handshake.room.as_deref().unwrap_or("-"),
            outcome = decision.outcome(),
            "admission decided"
        );

        match &decision {
            Decision::Admit { room, .. } => {
                session.join(room).await?;
                session.emit(ServerEvent::joined(room.clone())).await?;
            }
            Decision::Reject(code) => {
                counters::rejections_total(code.as_str());
                let emitted = session.emit(ServerEvent::error(*code)).await;
                session.disconnect().await?;
                emitted?;
            }
            Decision::Noop | Decision::Unvalidated => {}
        }

        Ok(decision)
    }

    async fn bounded<T, F>(&self, lookup: &'static str, fut: F) -> Result<T, ErrorCode>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let start = Instant::now();
        let result = timeout(self.config.lookup_timeout, fut).await;
        histograms::lookup_seconds(lookup, start.elapsed().as_secs_f64());

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(lookup, error = %e, "store lookup failed");
                Err(ErrorCode::Unavailable)
            }
            Err(_) => {
                warn!(
                    lookup,
                    timeout_ms = self.config.lookup_timeout.as_millis() as u64,
                    "store lookup timed out"
                );
                Err(ErrorCode::Timeout)
            }
        }
    }
}
