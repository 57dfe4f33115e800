//! # pbkv Client
//!
//! Purpose: Give application threads pooled, concurrent and self-healing access
//! to a multi-node key-value cluster over the length-prefixed protobuf protocol.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Every TCP connection is opened once and recycled
//!    through one cluster-wide queue.
//! 2. **Exclusive Leases**: A `Session` owns its node outright; mutual
//!    exclusion comes from ownership, not locks.
//! 3. **Self-Healing**: A background health loop pings idle nodes and redials
//!    dead ones with exponential backoff.
//! 4. **Thin Builders**: Objects, counters, queries and data types are small
//!    layers over `Session::execute`.
//!
//! ```no_run
//! use pbkv_client::{Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig::with_addrs(["127.0.0.1:8087"]))?;
//! client.dial()?;
//! let mut session = client.session()?;
//! session.bucket("users").object("alice").store(b"hello")?;
//! session.release();
//! client.close();
//! # Ok::<(), pbkv_client::ClientError>(())
//! ```

mod backoff;
mod bucket;
mod client;
mod config;
mod counter;
pub mod crdt;
mod error;
mod health;
mod node;
mod object;
mod pool;
mod query;
mod session;
mod stream;

pub use backoff::Backoff;
pub use bucket::{Bucket, BucketRef};
pub use client::Client;
pub use config::ClientConfig;
pub use counter::PlainCounter;
pub use crdt::{Counter, Crdt, DtRequest, Map, MapFieldType, Set};
pub use error::{ClientError, ClientResult};
pub use node::{Node, NodeState};
pub use object::Object;
pub use pool::Pool;
pub use query::Query;
pub use session::Session;
pub use stream::{StreamCall, StreamFrame, StreamState};

pub use pbkv_common::messages;
pub use pbkv_common::{OpCode, Response};
