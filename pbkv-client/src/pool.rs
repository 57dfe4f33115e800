//! # Node Pool
//!
//! Purpose: Hold a fixed set of nodes and lend each one to exactly one caller
//! at a time.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Nodes are created once and recycled; the pool
//!    never dials or grows.
//! 2. **Ownership Is Exclusion**: A node travels through a bounded channel by
//!    value. Whoever holds it is its only user; no lock guards the socket.
//! 3. **Block, Don't Spin**: `acquire` parks the caller on the channel until a
//!    node is released.
//! 4. **Queue Fairness**: Merged pools hand out nodes first-in first-out, which
//!    rotates load across addresses without a ring.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::node::Node;

/// Bounded blocking pool of nodes.
pub struct Pool {
    label: String,
    tx: Sender<Node>,
    rx: Receiver<Node>,
    capacity: usize,
}

impl Pool {
    /// Creates `count` undialed nodes for one address.
    ///
    /// Node ids are assigned from `first_id` upward.
    pub fn new(addr: &str, count: usize, config: &ClientConfig, first_id: usize) -> Self {
        let nodes = (0..count)
            .map(|offset| Node::new(first_id + offset, addr, config))
            .collect();
        Pool::from_nodes(addr, nodes)
    }

    /// Wraps existing nodes; capacity is the node count.
    pub fn from_nodes(label: impl Into<String>, nodes: Vec<Node>) -> Self {
        let capacity = nodes.len();
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        for node in nodes {
            // Capacity equals the node count, so this never blocks.
            let _ = tx.send(node);
        }
        Pool {
            label: label.into(),
            tx,
            rx,
            capacity,
        }
    }

    /// Merges per-address pools into one cluster-wide queue.
    ///
    /// Nodes are interleaved across the inputs so consecutive acquires visit
    /// different addresses.
    pub fn merge(pools: Vec<Pool>) -> Self {
        let mut sources: Vec<Vec<Node>> = pools.iter().map(Pool::drain_idle).collect();
        let total = sources.iter().map(Vec::len).sum();
        let mut nodes = Vec::with_capacity(total);
        for source in &mut sources {
            source.reverse();
        }
        while nodes.len() < total {
            for source in &mut sources {
                if let Some(node) = source.pop() {
                    nodes.push(node);
                }
            }
        }
        Pool::from_nodes("cluster", nodes)
    }

    /// Blocks until a node is free.
    pub fn acquire(&self) -> ClientResult<Node> {
        // The pool owns a sender, so the channel cannot disconnect while `self`
        // is alive.
        self.rx.recv().map_err(|_| ClientError::Closed)
    }

    /// Waits at most `timeout` for a free node.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Node> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_acquire(&self) -> Option<Node> {
        self.rx.try_recv().ok()
    }

    /// Returns a node to the pool.
    pub fn release(&self, node: Node) {
        match self.tx.try_send(node) {
            Ok(()) => {}
            Err(TrySendError::Full(mut node)) | Err(TrySendError::Disconnected(mut node)) => {
                warn!(pool = %self.label, node = node.id(), "pool full, closing foreign node");
                node.close();
            }
        }
    }

    /// Takes every node that is currently idle.
    pub fn drain_idle(&self) -> Vec<Node> {
        self.rx.try_iter().collect()
    }

    /// Total nodes owned by the pool, idle or leased.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Nodes currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.rx.len()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn pool_of(addrs: &[&str], per_node: usize) -> Pool {
        let config = ClientConfig::default();
        let pools = addrs
            .iter()
            .enumerate()
            .map(|(idx, addr)| Pool::new(addr, per_node, &config, idx * per_node))
            .collect();
        Pool::merge(pools)
    }

    #[test]
    fn merge_interleaves_addresses() {
        let pool = pool_of(&["a:1", "b:1"], 2);
        assert_eq!(pool.capacity(), 4);
        let order: Vec<String> = (0..4)
            .map(|_| pool.try_acquire().unwrap().addr().to_string())
            .collect();
        assert_eq!(order, ["a:1", "b:1", "a:1", "b:1"]);
        assert!(pool.try_acquire().is_none());
    }

    #[test]
    fn acquire_waits_for_release() {
        let pool = Arc::new(pool_of(&["a:1"], 1));
        let node = pool.acquire().unwrap();
        assert!(pool.acquire_timeout(Duration::from_millis(20)).is_none());

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire().unwrap().id())
        };
        thread::sleep(Duration::from_millis(20));
        pool.release(node);
        assert_eq!(waiter.join().unwrap(), 0);
    }

    #[test]
    fn concurrent_leases_are_exclusive() {
        let pool = Arc::new(pool_of(&["a:1", "b:1"], 2));
        let leased = Arc::new(parking_lot::Mutex::new(HashSet::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let leased = Arc::clone(&leased);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let node = pool.acquire().unwrap();
                        assert!(leased.lock().insert(node.id()), "node leased twice");
                        thread::yield_now();
                        assert!(leased.lock().remove(&node.id()));
                        pool.release(node);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.idle(), 4);
    }

    #[test]
    fn release_beyond_capacity_is_dropped() {
        let pool = pool_of(&["a:1"], 1);
        pool.release(Node::new(99, "x:1", &ClientConfig::default()));
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.acquire().unwrap().id(), 0);
    }
}
