//! # Node
//!
//! Purpose: Own one TCP socket to one cluster address and move whole envelopes
//! across it.
//!
//! ## Design Principles
//! 1. **Whole Frames Only**: Writes send the full envelope or fail; reads block
//!    for one complete envelope, so code and payload are never split.
//! 2. **Failure Marks Down**: Any socket failure drops the stream and marks the
//!    node `Down`; the health loop reconnects it later.
//! 3. **Buffer Reuse**: Each node keeps its own write buffer and buffered reader.
//! 4. **Interruptible Backoff**: Reconnect waits on the shutdown channel, so
//!    closing the client never sits out a long backoff.

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use pbkv_common::frame::{self, LENGTH_PREFIX_SIZE};
use pbkv_common::{Frame, OpCode, Response, WireError};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Liveness of a node's socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Active,
    Down,
}

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    connect: Duration,
    read: Option<Duration>,
    write: Option<Duration>,
}

/// One pooled connection to one cluster address.
#[derive(Debug)]
pub struct Node {
    id: usize,
    addr: String,
    conn: Option<Connection>,
    state: NodeState,
    backoff: Backoff,
    timeouts: Timeouts,
}

impl Node {
    /// Creates an undialed node. It starts `Down` until `dial` succeeds.
    pub fn new(id: usize, addr: impl Into<String>, config: &ClientConfig) -> Self {
        Node {
            id,
            addr: addr.into(),
            conn: None,
            state: NodeState::Down,
            backoff: Backoff::new(config.backoff_base, config.backoff_max),
            timeouts: Timeouts {
                connect: config.connect_timeout,
                read: config.read_timeout,
                write: config.write_timeout,
            },
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == NodeState::Active
    }

    /// Wait the next reconnect attempt will sleep.
    pub fn backoff(&self) -> Duration {
        self.backoff.current()
    }

    /// Opens a fresh socket, replacing any previous one.
    ///
    /// Success marks the node `Active` and resets its backoff.
    pub fn dial(&mut self) -> ClientResult<()> {
        self.close();
        match Connection::open(&self.addr, self.timeouts) {
            Ok(conn) => {
                self.conn = Some(conn);
                self.state = NodeState::Active;
                self.backoff.reset();
                debug!(node = self.id, addr = %self.addr, "node connected");
                Ok(())
            }
            Err(err) => {
                self.state = NodeState::Down;
                debug!(node = self.id, addr = %self.addr, error = %err, "node dial failed");
                Err(ClientError::Connection(err))
            }
        }
    }

    /// Sleeps the current backoff, then attempts one dial.
    ///
    /// Returns `Closed` without dialing if `shutdown` fires or disconnects
    /// while waiting. A failed dial doubles the backoff.
    pub fn reconnect(&mut self, shutdown: &Receiver<()>) -> ClientResult<()> {
        match shutdown.recv_timeout(self.backoff.current()) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return Err(ClientError::Closed),
        }
        match self.dial() {
            Ok(()) => {
                info!(node = self.id, addr = %self.addr, "node reconnected");
                Ok(())
            }
            Err(err) => {
                self.backoff.record_failure();
                warn!(
                    node = self.id,
                    addr = %self.addr,
                    next_wait = ?self.backoff.current(),
                    "node reconnect failed"
                );
                Err(err)
            }
        }
    }

    /// Sends one complete envelope.
    ///
    /// An oversized frame is refused before anything is written, so the
    /// node stays usable.
    pub fn write(&mut self, frame: &Frame) -> ClientResult<()> {
        frame.check_size()?;
        self.io(|conn| conn.send(frame))
    }

    /// Blocks until one complete envelope arrives.
    pub fn read_frame(&mut self) -> ClientResult<Frame> {
        self.io(Connection::recv)
    }

    /// Reads and decodes one response.
    pub fn read_response(&mut self) -> ClientResult<Response> {
        let frame = self.read_frame()?;
        Ok(Response::decode(&frame)?)
    }

    /// Sends one request and reads its response.
    pub fn execute(&mut self, frame: &Frame) -> ClientResult<Response> {
        self.write(frame)?;
        self.read_response()
    }

    /// Health probe: op 1 must be answered by op 2.
    pub fn ping(&mut self) -> ClientResult<()> {
        match self.execute(&Frame::empty(OpCode::PingReq))? {
            Response::Ping => Ok(()),
            Response::Error(err) => Err(err.into()),
            other => Err(ClientError::UnexpectedResponse {
                expected: OpCode::PingResp.name(),
                actual: other.name(),
            }),
        }
    }

    /// Ping whose reply wait is capped at `limit` on top of the configured
    /// read timeout. A late reply would desync the stream, so a timeout
    /// marks the node down like any other socket error.
    pub fn probe(&mut self, limit: Duration) -> ClientResult<()> {
        let bound = self
            .timeouts
            .read
            .map_or(limit, |read| read.min(limit))
            .max(Duration::from_millis(1));
        self.set_read_timeout(Some(bound))?;
        let result = self.ping();
        if result.is_ok() {
            self.set_read_timeout(self.timeouts.read)?;
        }
        result
    }

    /// Second handle on the socket, so another thread can unblock a pending
    /// read by shutting it down.
    pub(crate) fn interrupt_handle(&self) -> Option<TcpStream> {
        self.conn
            .as_ref()
            .and_then(|conn| conn.reader.get_ref().try_clone().ok())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> ClientResult<()> {
        self.io(|conn| Ok(conn.reader.get_ref().set_read_timeout(timeout)?))
    }

    /// Drops the socket and marks the node `Down`.
    pub fn mark_down(&mut self) {
        if self.state == NodeState::Active {
            warn!(node = self.id, addr = %self.addr, "node marked down");
        }
        self.state = NodeState::Down;
        self.close();
    }

    /// Shuts the socket down. Safe to call on a node that is already closed.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.shutdown();
            self.state = NodeState::Down;
        }
    }

    fn io<T>(&mut self, op: impl FnOnce(&mut Connection) -> ClientResult<T>) -> ClientResult<T> {
        let id = self.id;
        let conn = self.conn.as_mut().ok_or_else(|| {
            ClientError::Connection(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("node {id} is not connected"),
            ))
        })?;
        let result = op(conn);
        if let Err(err) = &result {
            if breaks_stream(err) {
                self.mark_down();
            }
        }
        result
    }
}

/// Errors after which the byte stream can no longer be trusted.
fn breaks_stream(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::Connection(_)
            | ClientError::Protocol(WireError::ZeroLength)
            | ClientError::Protocol(WireError::FrameTooLarge { .. })
    )
}

/// Socket plus reusable buffers.
#[derive(Debug)]
struct Connection {
    reader: BufReader<TcpStream>,
    write_buf: BytesMut,
}

impl Connection {
    fn open(addr: &str, timeouts: Timeouts) -> io::Result<Self> {
        let stream = connect_stream(addr, timeouts.connect)?;
        stream.set_read_timeout(timeouts.read)?;
        stream.set_write_timeout(timeouts.write)?;
        stream.set_nodelay(true)?;

        Ok(Connection {
            reader: BufReader::new(stream),
            write_buf: BytesMut::with_capacity(256),
        })
    }

    fn send(&mut self, frame: &Frame) -> ClientResult<()> {
        self.write_buf.clear();
        frame.encode(&mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> ClientResult<Frame> {
        let mut header = [0u8; LENGTH_PREFIX_SIZE];
        self.reader.read_exact(&mut header)?;
        let len = u32::from_be_bytes(header);
        frame::check_len(len)?;

        let mut body = vec![0u8; len as usize];
        self.reader.read_exact(&mut body)?;
        Ok(Frame::from_body(Bytes::from(body))?)
    }

    fn shutdown(self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

fn connect_stream(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for sock_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&sock_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{addr} did not resolve to any address"),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn config() -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(500),
            read_timeout: Some(Duration::from_secs(2)),
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(80),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn new_node_is_down() {
        let node = Node::new(3, "127.0.0.1:1", &config());
        assert_eq!(node.id(), 3);
        assert_eq!(node.state(), NodeState::Down);
    }

    #[test]
    fn truncated_frame_marks_down() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut req = [0u8; 5];
            stream.read_exact(&mut req).unwrap();
            // Claims 10 bytes, sends 3, then hangs up.
            stream.write_all(&[0, 0, 0, 10, 2, 0, 0]).unwrap();
        });

        let mut node = Node::new(0, addr, &config());
        node.dial().unwrap();
        assert!(node.is_active());
        let err = node.ping().unwrap_err();
        assert!(err.is_connection(), "{err}");
        assert_eq!(node.state(), NodeState::Down);
        server.join().unwrap();
    }

    #[test]
    fn reconnect_doubles_backoff_until_success() {
        let mut node = Node::new(0, "127.0.0.1:1", &config());
        let (_tx, rx) = crossbeam_channel::bounded::<()>(1);
        assert!(node.reconnect(&rx).is_err());
        assert_eq!(node.backoff(), Duration::from_millis(20));
        assert!(node.reconnect(&rx).is_err());
        assert_eq!(node.backoff(), Duration::from_millis(40));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        node.addr = listener.local_addr().unwrap().to_string();
        node.reconnect(&rx).unwrap();
        assert!(node.is_active());
        assert_eq!(node.backoff(), Duration::from_millis(10));
    }

    #[test]
    fn reconnect_stops_on_shutdown() {
        let mut cfg = config();
        cfg.backoff_base = Duration::from_secs(60);
        cfg.backoff_max = Duration::from_secs(60);
        let mut node = Node::new(0, "127.0.0.1:1", &cfg);
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        drop(tx);
        assert!(matches!(node.reconnect(&rx), Err(ClientError::Closed)));
    }

    #[test]
    fn health_ping_gives_up_on_a_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut cfg = config();
        cfg.read_timeout = None;
        let mut node = Node::new(0, listener.local_addr().unwrap().to_string(), &cfg);
        node.dial().unwrap();
        // Accepted but never answered.
        let (_peer, _) = listener.accept().unwrap();

        let started = std::time::Instant::now();
        let err = node.probe(Duration::from_millis(50)).unwrap_err();
        assert!(err.is_connection(), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(node.state(), NodeState::Down);
    }

    #[test]
    fn interrupt_handle_unblocks_a_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut cfg = config();
        cfg.read_timeout = None;
        let mut node = Node::new(0, listener.local_addr().unwrap().to_string(), &cfg);
        node.dial().unwrap();
        let (_peer, _) = listener.accept().unwrap();

        let handle = node.interrupt_handle().unwrap();
        let reader = thread::spawn(move || node.ping().map(|_| node.state()));
        thread::sleep(Duration::from_millis(50));
        handle.shutdown(Shutdown::Both).unwrap();
        let result = reader.join().unwrap();
        assert!(matches!(result, Err(ref err) if err.is_connection()), "{result:?}");
    }

    #[test]
    fn oversized_write_is_refused_without_marking_down() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut node = Node::new(0, listener.local_addr().unwrap().to_string(), &config());
        node.dial().unwrap();
        let frame = Frame::new(OpCode::PutReq, vec![0u8; frame::MAX_FRAME_LEN as usize]);
        let err = node.write(&frame).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(WireError::FrameTooLarge { .. })));
        assert!(node.is_active());
    }

    #[test]
    fn close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut node = Node::new(0, listener.local_addr().unwrap().to_string(), &config());
        node.dial().unwrap();
        node.close();
        node.close();
        assert_eq!(node.state(), NodeState::Down);
    }
}
