// main.rs - standalone pbkv node
//
// Usage: pbkv-server [config.json]
//
// The optional argument names a JSON file holding a `ServerConfig`; missing
// fields take their defaults. Log verbosity follows RUST_LOG (default: info).

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pbkv_server::{server, ServerConfig, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            serde_json::from_str::<ServerConfig>(&raw)
                .with_context(|| format!("parsing config file {path}"))?
        }
        None => ServerConfig::default(),
    };

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    let state = Arc::new(ServerState::new(config));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
        }
        let _ = shutdown_tx.send(());
    });

    server::serve(listener, Arc::clone(&state), shutdown_rx).await?;

    let metrics = state.metrics.snapshot();
    info!(
        requests = metrics.requests_total,
        errors = metrics.errors_total,
        connections = metrics.connections_total,
        "server stopped"
    );
    Ok(())
}
