use crate::admission::AdmissionGate;
use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::TchatsError;
use crate::registry::RoomRegistry;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tchat_common::SessionId;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Shared state for the admission server.
pub struct ServerState {
    /// Admission gate shared by every connection task.
    pub gate: AdmissionGate,
    /// Room → active sessions registry.
    pub registry: RoomRegistry,
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// Open WebSocket connections, checked against `max_conns`.
    pub active_connections: AtomicUsize,
    next_session: AtomicU64,
}

impl ServerState {
    /// Create state with an empty registry.
    #[must_use]
    pub fn new(gate: AdmissionGate, config: ServerConfig) -> Self {
        Self {
            gate,
            registry: RoomRegistry::new(),
            config,
            active_connections: AtomicUsize::new(0),
            next_session: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh session id.
    pub fn next_session_id(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }
}

/// Releases a connection slot when the connection task ends.
struct ConnectionSlot {
    state: Arc<ServerState>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.active_connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run the accept loop until the process exits.
///
/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), TchatsError> {
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    run_with_shutdown(listener, state, shutdown_rx).await
}

/// Run the server accept loop with an externally-controlled shutdown signal.
///
/// When the sender paired with `shutdown_rx` is signalled or dropped, the
/// accept loop stops accepting new connections and waits up to 30 seconds
/// for in-flight connections to finish.
///
/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: tokio::sync::watch::Receiver<()>,
) -> Result<(), TchatsError> {
    let local_addr = listener.local_addr()?;
    info!("server listening on {}", local_addr);
    let task_tracker = Arc::new(tokio::sync::Notify::new());

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        // Only this loop increments, so check-then-add cannot overshoot.
                        let active = state.active_connections.load(Ordering::Acquire);
                        if active >= state.config.max_conns {
                            warn!("max connections reached, rejecting {}", addr);
                            drop(stream);
                            continue;
                        }
                        state.active_connections.fetch_add(1, Ordering::AcqRel);
                        let slot = ConnectionSlot { state: Arc::clone(&state) };
                        let state = Arc::clone(&state);
                        let tracker = task_tracker.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state).await {
                                tracing::debug!("connection from {} closed: {}", addr, e);
                            }
                            drop(slot);
                            tracker.notify_one();
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!(
                    "shutdown signal received, draining {} connections",
                    state.active_connections.load(Ordering::Acquire)
                );
                break;
            }
        }
    }

    let drain_timeout = std::time::Duration::from_secs(30);
    let deadline = tokio::time::Instant::now() + drain_timeout;
    // A stored Notify permit covers a task finishing between the load and
    // the wait; the count is re-read after every wakeup.
    while state.active_connections.load(Ordering::Acquire) > 0 {
        if tokio::time::timeout_at(deadline, task_tracker.notified())
            .await
            .is_err()
        {
            warn!(
                "drain timeout reached with {} connections still active",
                state.active_connections.load(Ordering::Acquire)
            );
            break;
        }
    }

    info!("server shut down gracefully");
    Ok(())
}
