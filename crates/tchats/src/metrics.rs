use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Shared readiness state. Starts not ready; the binary flips it once the
/// listener is bound.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new, not yet ready, health state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the service as ready or not.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// Serve `/metrics`, `/health` and `/ready` on `addr`.
///
/// # Errors
///
/// Returns an error if the recorder is already installed or binding fails.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health_state: HealthState,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(health_state.clone())));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

async fn ready_handler(state: HealthState) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not ready",
                ready: false,
            }),
        )
    }
}

/// Session and room gauges.
pub mod gauges {
    /// Increment the open sessions gauge.
    pub fn inc_sessions_active() {
        metrics::gauge!("tchat_sessions_active").increment(1.0);
    }

    /// Decrement the open sessions gauge.
    pub fn dec_sessions_active() {
        metrics::gauge!("tchat_sessions_active").decrement(1.0);
    }

    /// Set the number of rooms with at least one joined session.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_rooms_active(rooms: usize) {
        metrics::gauge!("tchat_rooms_active").set(rooms as f64);
    }
}

/// Event counters.
pub mod counters {
    /// Record an admission decision with the given outcome label.
    pub fn admissions_total(outcome: &'static str) {
        metrics::counter!("tchat_admissions_total", "outcome" => outcome).increment(1);
    }

    /// Record a rejection with its error code label.
    pub fn rejections_total(code: &'static str) {
        metrics::counter!("tchat_rejections_total", "code" => code).increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record how long a store lookup took, in seconds.
    pub fn lookup_seconds(lookup: &'static str, value: f64) {
        metrics::histogram!("tchat_lookup_seconds", "lookup" => lookup).record(value);
    }
}
