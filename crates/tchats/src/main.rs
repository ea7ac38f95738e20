#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tchat_common::token;
use tchats::admission::AdmissionGate;
use tchats::config::{Args, ServerConfig};
use tchats::error::TchatsError;
use tchats::metrics::{start_metrics_server, HealthState};
use tchats::server::{run_with_shutdown, ServerState};
use tchats::store::{FormatValidator, MemoryStore};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.gen_token {
        println!("{}", token::generate());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config: ServerConfig = args.into();

    config.validate().map_err(TchatsError::Config)?;

    let store = match config.seed {
        Some(ref path) => {
            let store = MemoryStore::load_seed(path)
                .map_err(TchatsError::from)
                .with_context(|| format!("loading seed {}", path.display()))?;
            info!(
                rooms = store.room_count(),
                tokens = store.token_count(),
                "loaded seed from {}",
                path.display()
            );
            store
        }
        None => {
            warn!("no seed file given, every token will be rejected");
            MemoryStore::new()
        }
    };
    let store = Arc::new(store);

    let gate = AdmissionGate::new(
        Arc::new(FormatValidator),
        store.clone(),
        store,
        config.gate(),
    );
    if !gate.config().strict_token_validation {
        info!("malformed tokens are ignored without a reply (pass --strict-tokens to reject them)");
    }

    let state = Arc::new(ServerState::new(gate, config.clone()));

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);

    let health_state = HealthState::new();
    tokio::spawn({
        let health_state = health_state.clone();
        async move {
            if let Err(e) = start_metrics_server(config.metrics_addr, health_state).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    let server = tokio::spawn(run_with_shutdown(listener, state, shutdown_rx));
    health_state.set_ready(true);

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    health_state.set_ready(false);
    let _ = shutdown_tx.send(());

    match server.await {
        Ok(Err(e)) => tracing::error!("server error: {}", e),
        Err(e) => tracing::error!("server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}
