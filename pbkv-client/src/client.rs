//! # Cluster Client
//!
//! Purpose: Own every pooled node for a cluster, drive the dial/close
//! lifecycle, and hand out sessions.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides pools, nodes and the health loop;
//!    callers only see `dial`, `session` and `close`.
//! 2. **One Queue**: Per-address pools are merged into a single cluster-wide
//!    queue at construction.
//! 3. **Degrade, Don't Fail**: Unreachable nodes stay in rotation as `Down`
//!    and are recovered by the health loop; only a cluster with no reachable
//!    node fails to dial.
//! 4. **Bounded Search**: `session` inspects at most one full pass of the pool
//!    before reporting `Unavailable`.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::health::HealthLoop;
use crate::pool::Pool;
use crate::session::Session;

/// State shared by the client, its sessions and its health probes.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) pool: Pool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Running,
    Closed,
}

struct State {
    lifecycle: Lifecycle,
    health: Option<HealthLoop>,
}

/// Pooled, health-checked client for a multi-node cluster.
pub struct Client {
    shared: Arc<Shared>,
    state: Mutex<State>,
}

impl Client {
    /// Builds the client and its nodes without connecting anything.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let per_node = config.connections_per_node;
        let pools = config
            .addrs
            .iter()
            .enumerate()
            .map(|(idx, addr)| Pool::new(addr, per_node, &config, idx * per_node))
            .collect();
        let pool = Pool::merge(pools);
        debug!(nodes = pool.capacity(), addrs = config.addrs.len(), "client created");

        Ok(Client {
            shared: Arc::new(Shared { config, pool }),
            state: Mutex::new(State {
                lifecycle: Lifecycle::New,
                health: None,
            }),
        })
    }

    /// Builds a client with default settings for the given addresses.
    pub fn connect<I, S>(addrs: I) -> ClientResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Client::new(ClientConfig::with_addrs(addrs))?;
        client.dial()?;
        Ok(client)
    }

    /// Dials every node once and starts the health loop.
    ///
    /// Unreachable nodes are kept as `Down`. Fails with `AllNodesDown` if no
    /// node connects; the client then stays undialed and may be dialed again.
    /// Dialing a running client is a no-op.
    pub fn dial(&self) -> ClientResult<()> {
        let mut state = self.state.lock();
        match state.lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Closed => return Err(ClientError::Closed),
            Lifecycle::New => {}
        }

        let mut nodes = self.shared.pool.drain_idle();
        thread::scope(|scope| {
            for node in nodes.iter_mut() {
                scope.spawn(move || {
                    if let Err(err) = node.dial() {
                        warn!(node = node.id(), addr = node.addr(), error = %err, "dial failed");
                    }
                });
            }
        });
        let total = nodes.len();
        let active = nodes.iter().filter(|node| node.is_active()).count();
        for node in nodes {
            self.shared.pool.release(node);
        }

        if active == 0 {
            warn!(total, "all nodes appear to be down");
            return Err(ClientError::AllNodesDown);
        }

        state.health = Some(HealthLoop::start(Arc::clone(&self.shared))?);
        state.lifecycle = Lifecycle::Running;
        info!(active, total, "client connected");
        Ok(())
    }

    /// Leases an active node.
    ///
    /// Blocks while every node is leased. Down nodes are put back and the
    /// next one is tried; after one full pass the result is `Unavailable`.
    pub fn session(&self) -> ClientResult<Session> {
        let lifecycle = self.state.lock().lifecycle;
        match lifecycle {
            Lifecycle::New => return Err(ClientError::NotConnected),
            Lifecycle::Closed => return Err(ClientError::Closed),
            Lifecycle::Running => {}
        }

        let pool = &self.shared.pool;
        for _ in 0..pool.capacity() {
            let node = pool.acquire()?;
            if node.is_active() {
                return Ok(Session::new(Arc::clone(&self.shared), node));
            }
            pool.release(node);
        }
        Err(ClientError::Unavailable)
    }

    /// Stops the health loop and closes every node exactly once.
    ///
    /// Waits for outstanding sessions to be released. Calling it again is a
    /// no-op.
    pub fn close(&self) {
        let mut health = {
            let mut state = self.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                return;
            }
            state.lifecycle = Lifecycle::Closed;
            state.health.take()
        };
        if let Some(health) = health.as_mut() {
            health.stop();
        }

        let pool = &self.shared.pool;
        let mut closed = Vec::with_capacity(pool.capacity());
        while closed.len() < pool.capacity() {
            match pool.acquire() {
                Ok(mut node) => {
                    node.close();
                    closed.push(node);
                }
                Err(_) => break,
            }
        }
        // Closed nodes go back so that any caller still blocked in `session`
        // wakes up and sees them as down.
        for node in closed {
            pool.release(node);
        }
        info!("client closed");
    }

    /// Whether `dial` has succeeded and `close` has not been called.
    pub fn is_running(&self) -> bool {
        self.state.lock().lifecycle == Lifecycle::Running
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Total pooled nodes across all addresses.
    pub fn capacity(&self) -> usize {
        self.shared.pool.capacity()
    }

    /// Nodes currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.shared.pool.idle()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(mut health) = self.state.get_mut().health.take() {
            health.stop();
        }
    }
}
