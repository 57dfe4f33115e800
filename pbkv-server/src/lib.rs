//! # pbkv Server
//!
//! Purpose: A single-process, in-memory node speaking the pbkv protobuf
//! protocol. It backs the client's integration tests and local development.
//!
//! ## Design Principles
//! 1. **Shared State, Owned Connections**: One `ServerState` behind an `Arc`;
//!    each connection task owns its buffers and client id.
//! 2. **Explicit Shutdown**: A oneshot channel stops the accept loop; dropping
//!    the runtime closes every open socket.
//! 3. **Embeddable**: `spawn_background` runs a server on its own thread and
//!    runtime so synchronous callers can start and stop nodes at will.

pub mod datatypes;
pub mod metrics;
pub mod server;
pub mod store;

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

pub use metrics::{Metrics, MetricsSnapshot};
pub use store::Store;

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address; port 0 picks a free port.
    pub addr: String,
    /// Name reported by server info.
    pub node_name: String,
    /// Keys per frame in streamed listings.
    pub list_keys_chunk: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: "127.0.0.1:8087".to_string(),
            node_name: "pbkv@127.0.0.1".to_string(),
            list_keys_chunk: 2,
        }
    }
}

impl ServerConfig {
    /// Default settings listening on `addr`.
    pub fn with_addr(addr: impl Into<String>) -> Self {
        ServerConfig {
            addr: addr.into(),
            ..ServerConfig::default()
        }
    }

    /// Chunk size used for streamed answers, never zero.
    pub fn chunk_size(&self) -> usize {
        self.list_keys_chunk.max(1)
    }
}

/// State shared by every connection.
pub struct ServerState {
    pub config: ServerConfig,
    pub store: Store,
    pub metrics: Metrics,
    client_ids: AtomicU32,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        ServerState {
            config,
            store: Store::new(),
            metrics: Metrics::new(),
            client_ids: AtomicU32::new(1),
        }
    }

    /// Fresh 4-byte client id for a new connection.
    pub(crate) fn next_client_id(&self) -> Vec<u8> {
        self.client_ids
            .fetch_add(1, Ordering::Relaxed)
            .to_be_bytes()
            .to_vec()
    }
}

/// A server running on a background thread.
///
/// Dropping the handle shuts the server down and waits for its thread.
pub struct ServerHandle {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn store(&self) -> &Store {
        &self.state.store
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.metrics.snapshot()
    }

    /// Stops accepting, closes all connections and joins the server thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts a server on its own thread and tokio runtime.
///
/// Returns once the listener is bound, so the address is immediately usable.
pub fn spawn_background(config: ServerConfig) -> io::Result<ServerHandle> {
    let state = Arc::new(ServerState::new(config));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("pbkv-server-worker")
        .enable_all()
        .build()?;
    let (bound_tx, bound_rx) = mpsc::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let thread_state = Arc::clone(&state);
    let thread = thread::Builder::new()
        .name("pbkv-server".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                let listener = match TcpListener::bind(&thread_state.config.addr).await {
                    Ok(listener) => listener,
                    Err(err) => {
                        let _ = bound_tx.send(Err(err));
                        return;
                    }
                };
                let addr = listener.local_addr();
                let bound = addr.is_ok();
                let _ = bound_tx.send(addr);
                if !bound {
                    return;
                }
                if let Err(err) = server::serve(listener, thread_state, shutdown_rx).await {
                    error!(error = %err, "server stopped");
                }
            });
            // Dropping the runtime here cancels connection tasks and closes
            // their sockets.
        })?;

    let addr = match bound_rx.recv() {
        Ok(Ok(addr)) => addr,
        Ok(Err(err)) => {
            let _ = thread.join();
            return Err(err);
        }
        Err(_) => {
            let _ = thread.join();
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "server thread exited before binding",
            ));
        }
    };
    info!(%addr, "background server started");

    Ok(ServerHandle {
        addr,
        state,
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    })
}
