//! # Health Loop
//!
//! Purpose: Keep pooled nodes alive in the background for the client's
//! lifetime.
//!
//! ## Design Principles
//! 1. **One Supervisor, Many Probes**: A single thread ticks on a fixed
//!    interval; every tick spawns one probe thread per idle node, so a stuck
//!    socket never delays the others or the next tick.
//! 2. **Lease Like A Caller**: Probes take nodes out of the pool and put them
//!    back, so a probe and a session never share a socket.
//! 3. **Explicit Shutdown**: Dropping the shutdown sender wakes the supervisor
//!    and every backoff sleep; in-flight probes are joined before `stop`
//!    returns.
//! 4. **Bounded Probes**: A ping waits at most one interval, and on shutdown
//!    the supervisor closes the socket of every probe still reading, so a
//!    silent peer can never hold up `stop`.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::client::Shared;
use crate::node::Node;

/// Handle to the background health loop.
pub(crate) struct HealthLoop {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HealthLoop {
    /// Starts the supervisor thread.
    pub(crate) fn start(shared: Arc<Shared>) -> io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("pbkv-health".into())
            .spawn(move || supervise(shared, shutdown_rx))?;
        Ok(HealthLoop {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Signals shutdown and joins the supervisor (which joins its probes).
    pub(crate) fn stop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("health loop panicked");
            }
        }
    }
}

impl Drop for HealthLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sockets of probes currently waiting on a ping.
#[derive(Debug, Default)]
struct InFlight {
    closing: bool,
    sockets: Vec<(usize, TcpStream)>,
}

impl InFlight {
    /// Records a probe's socket. Returns false once shutdown has begun.
    fn register(&mut self, node: usize, socket: Option<TcpStream>) -> bool {
        if self.closing {
            return false;
        }
        if let Some(socket) = socket {
            self.sockets.push((node, socket));
        }
        true
    }

    fn unregister(&mut self, node: usize) {
        self.sockets.retain(|(id, _)| *id != node);
    }

    /// Refuses new probes and unblocks every registered read.
    fn close_all(&mut self) {
        self.closing = true;
        for (node, socket) in self.sockets.drain(..) {
            debug!(node, "interrupting probe");
            let _ = socket.shutdown(Shutdown::Both);
        }
    }
}

fn supervise(shared: Arc<Shared>, shutdown: Receiver<()>) {
    let interval = shared.config.health_interval;
    let ticker = crossbeam_channel::tick(interval);
    let in_flight = Arc::new(Mutex::new(InFlight::default()));
    let mut probes: Vec<JoinHandle<()>> = Vec::new();
    info!(?interval, "health loop started");

    loop {
        select! {
            recv(ticker) -> _ => {
                reap_finished(&mut probes);
                for node in shared.pool.drain_idle() {
                    if let Some(handle) = spawn_probe(&shared, node, &shutdown, &in_flight) {
                        probes.push(handle);
                    }
                }
            }
            recv(shutdown) -> _ => break,
        }
    }

    in_flight.lock().close_all();
    for probe in probes {
        let _ = probe.join();
    }
    info!("health loop stopped");
}

fn reap_finished(probes: &mut Vec<JoinHandle<()>>) {
    let mut idx = 0;
    while idx < probes.len() {
        if probes[idx].is_finished() {
            let _ = probes.swap_remove(idx).join();
        } else {
            idx += 1;
        }
    }
}

fn spawn_probe(
    shared: &Arc<Shared>,
    node: Node,
    shutdown: &Receiver<()>,
    in_flight: &Arc<Mutex<InFlight>>,
) -> Option<JoinHandle<()>> {
    let node_id = node.id();
    let task_shared = Arc::clone(shared);
    let task_shutdown = shutdown.clone();
    let task_in_flight = Arc::clone(in_flight);
    // The closure owns the node; if the spawn fails it is handed back below.
    let slot = Arc::new(Mutex::new(Some(node)));
    let task_slot = Arc::clone(&slot);
    let spawned = thread::Builder::new()
        .name(format!("pbkv-probe-{node_id}"))
        .spawn(move || {
            if let Some(node) = task_slot.lock().take() {
                probe(&task_shared, node, &task_shutdown, &task_in_flight);
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(node = node_id, error = %err, "failed to spawn probe");
            if let Some(node) = slot.lock().take() {
                shared.pool.release(node);
            }
            None
        }
    }
}

/// Pings an active node, reconnects a down one, then returns it to the pool.
fn probe(shared: &Shared, mut node: Node, shutdown: &Receiver<()>, in_flight: &Mutex<InFlight>) {
    let id = node.id();
    if node.is_active() {
        if !in_flight.lock().register(id, node.interrupt_handle()) {
            shared.pool.release(node);
            return;
        }
        let result = node.probe(shared.config.health_interval);
        in_flight.lock().unregister(id);
        if let Err(err) = result {
            debug!(node = id, error = %err, "probe failed");
            node.mark_down();
        }
    }
    if !node.is_active() {
        // Failures are logged by the node and retried next tick.
        let _ = node.reconnect(shutdown);
    }
    shared.pool.release(node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let local = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (remote, _) = listener.accept().unwrap();
        (local, remote)
    }

    #[test]
    fn close_all_shuts_registered_sockets() {
        let (local, mut remote) = pair();
        let mut in_flight = InFlight::default();
        assert!(in_flight.register(7, Some(local)));
        in_flight.close_all();

        let mut buf = [0u8; 1];
        assert_eq!(remote.read(&mut buf).unwrap(), 0);
        assert!(in_flight.sockets.is_empty());
    }

    #[test]
    fn no_registration_after_close() {
        let (local, _remote) = pair();
        let mut in_flight = InFlight::default();
        in_flight.close_all();
        assert!(!in_flight.register(1, Some(local)));
        assert!(!in_flight.register(2, None));
    }

    #[test]
    fn unregister_drops_only_that_node() {
        let (first, _r1) = pair();
        let (second, _r2) = pair();
        let mut in_flight = InFlight::default();
        in_flight.register(1, Some(first));
        in_flight.register(2, Some(second));
        in_flight.unregister(1);
        assert_eq!(in_flight.sockets.len(), 1);
        assert_eq!(in_flight.sockets[0].0, 2);
    }
}
