use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use pbkv_client::{Client, ClientConfig, ClientError};
use pbkv_common::messages::RpbErrorResp;
use pbkv_common::{Frame, OpCode, WireError};
use pbkv_server::{spawn_background, ServerConfig, ServerHandle};
use prost::Message;

fn spawn_fake(expected_frames: usize, handler: fn(usize, Frame, &mut TcpStream)) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
        for idx in 0..expected_frames {
            let frame = read_frame(&mut stream).expect("read frame");
            handler(idx, frame, &mut stream);
        }
    });

    addr
}

/// Accepts connections and holds them open without ever replying.
fn spawn_silent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => held.push(stream),
                Err(_) => break,
            }
        }
    });
    addr
}

fn read_frame(stream: &mut TcpStream) -> std::io::Result<Frame> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header)?;
    let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
    stream.read_exact(&mut body)?;
    Frame::from_body(Bytes::from(body))
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

fn write_raw(stream: &mut TcpStream, bytes: &[u8]) {
    let _ = stream.write_all(bytes);
    let _ = stream.flush();
}

fn fake_config(addr: String) -> ClientConfig {
    ClientConfig {
        addrs: vec![addr],
        connections_per_node: 1,
        connect_timeout: Duration::from_secs(1),
        read_timeout: Some(Duration::from_secs(2)),
        write_timeout: Some(Duration::from_secs(2)),
        ..ClientConfig::default()
    }
}

fn dialed(config: ClientConfig) -> Client {
    let client = Client::new(config).expect("client");
    client.dial().expect("dial");
    client
}

fn server() -> ServerHandle {
    spawn_background(ServerConfig::with_addr("127.0.0.1:0")).expect("server")
}

fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);
    addr
}

#[test]
fn lifecycle_errors() {
    let server = server();
    let client = Client::new(fake_config(server.addr().to_string())).expect("client");
    assert!(matches!(client.session(), Err(ClientError::NotConnected)));

    client.dial().expect("dial");
    client.dial().expect("second dial is a no-op");
    assert!(client.is_running());
    client.session().expect("session").ping().expect("ping");

    client.close();
    client.close();
    assert!(!client.is_running());
    assert!(matches!(client.session(), Err(ClientError::Closed)));
    assert!(matches!(client.dial(), Err(ClientError::Closed)));
}

#[test]
fn dial_with_every_node_down() {
    let mut config = fake_config(closed_port());
    config.addrs.push(closed_port());
    let client = Client::new(config).expect("client");
    assert!(matches!(client.dial(), Err(ClientError::AllNodesDown)));
    assert!(!client.is_running());
}

#[test]
fn one_live_node_is_enough() {
    let server = server();
    let config = ClientConfig {
        addrs: vec![closed_port(), server.addr().to_string()],
        connections_per_node: 2,
        connect_timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    };
    let client = dialed(config);
    assert_eq!(client.capacity(), 4);

    // Sessions only ever land on the live address.
    for _ in 0..6 {
        let mut session = client.session().expect("session");
        assert_eq!(session.addr(), Some(server.addr().to_string().as_str()));
        session.ping().expect("ping");
    }
    client.close();
}

#[test]
fn sessions_never_share_a_node() {
    let first = server();
    let second = server();
    let config = ClientConfig {
        addrs: vec![first.addr().to_string(), second.addr().to_string()],
        connections_per_node: 2,
        ..ClientConfig::default()
    };
    let client = Arc::new(dialed(config));
    let leased = Arc::new(Mutex::new(HashSet::new()));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            let leased = Arc::clone(&leased);
            thread::spawn(move || {
                for _ in 0..50 {
                    let mut session = client.session().expect("session");
                    let id = session.node_id().expect("node id");
                    assert!(leased.lock().unwrap().insert(id), "node {id} leased twice");
                    session.ping().expect("ping");
                    assert!(leased.lock().unwrap().remove(&id));
                    session.release();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker");
    }

    assert_eq!(client.idle(), 4);
    client.close();
}

#[test]
fn health_loop_recovers_after_restart() {
    let server = server();
    let addr = server.addr();
    let config = ClientConfig {
        addrs: vec![addr.to_string()],
        connections_per_node: 2,
        connect_timeout: Duration::from_millis(500),
        read_timeout: Some(Duration::from_secs(1)),
        health_interval: Duration::from_millis(50),
        backoff_base: Duration::from_millis(20),
        backoff_max: Duration::from_millis(200),
        ..ClientConfig::default()
    };
    let client = dialed(config);
    client.session().expect("session").ping().expect("ping");

    server.shutdown();
    let restarted = spawn_background(ServerConfig::with_addr(addr.to_string())).expect("restart");

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let healthy = client
            .session()
            .and_then(|mut session| session.ping())
            .is_ok();
        if healthy {
            break;
        }
        assert!(Instant::now() < deadline, "client never recovered");
        thread::sleep(Duration::from_millis(50));
    }

    client.close();
    drop(restarted);
}

#[test]
fn unknown_op_code_is_protocol_error() {
    let addr = spawn_fake(1, |_, frame, stream| {
        assert_eq!(frame.op().unwrap(), OpCode::PingReq);
        write_raw(stream, &[0, 0, 0, 1, 99]);
    });
    let client = dialed(fake_config(addr));
    let mut session = client.session().expect("session");
    let err = session.ping().unwrap_err();
    assert!(
        matches!(err, ClientError::Protocol(WireError::UnknownOpCode(99))),
        "got {err:?}"
    );
}

#[test]
fn error_frame_is_remote_error() {
    let addr = spawn_fake(1, |_, _, stream| {
        let reply = RpbErrorResp {
            errmsg: b"no such bucket".to_vec(),
            errcode: 7,
        };
        let frame = Frame::new(OpCode::ErrorResp, reply.encode_to_vec());
        write_raw(stream, &frame.encode_to_bytes());
    });
    let client = dialed(fake_config(addr));
    let mut session = client.session().expect("session");
    match session.ping() {
        Err(ClientError::Remote { code, message }) => {
            assert_eq!(code, 7);
            assert_eq!(message, "no such bucket");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn truncated_reply_is_connection_error() {
    let addr = spawn_fake(1, |_, _, stream| {
        // Promises ten bytes, delivers three, then hangs up.
        write_raw(stream, &[0, 0, 0, 10, 10, 1, 2]);
    });
    let client = dialed(fake_config(addr));
    let mut session = client.session().expect("session");
    let err = session.ping().unwrap_err();
    assert!(err.is_connection(), "got {err:?}");
    session.release();

    // The only node is now down, so the next lease finds nothing usable.
    assert!(matches!(client.session(), Err(ClientError::Unavailable)));
}

#[test]
fn close_returns_while_a_health_ping_waits_on_a_silent_node() {
    let config = ClientConfig {
        addrs: vec![spawn_silent()],
        connections_per_node: 1,
        health_interval: Duration::from_millis(50),
        ..ClientConfig::default()
    };
    assert_eq!(config.read_timeout, None);
    let client = dialed(config);
    thread::sleep(Duration::from_millis(300));

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        client.close();
        let _ = done_tx.send(());
    });
    assert!(
        done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "close hung on a silent node"
    );
}

#[test]
fn close_interrupts_a_long_health_check() {
    // A health ping may wait a full interval; close must not sit it out.
    let config = ClientConfig {
        addrs: vec![spawn_silent()],
        connections_per_node: 2,
        health_interval: Duration::from_millis(100),
        ..ClientConfig::default()
    };
    let client = dialed(config);
    thread::sleep(Duration::from_millis(150));

    let started = Instant::now();
    client.close();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(client.session(), Err(ClientError::Closed)));
}

#[test]
fn silent_node_comes_back_to_the_pool() {
    let config = ClientConfig {
        addrs: vec![spawn_silent()],
        connections_per_node: 1,
        health_interval: Duration::from_millis(50),
        backoff_base: Duration::from_millis(20),
        backoff_max: Duration::from_millis(100),
        ..ClientConfig::default()
    };
    let client = Arc::new(dialed(config));
    thread::sleep(Duration::from_millis(200));

    let (done_tx, done_rx) = mpsc::channel();
    let leasing = Arc::clone(&client);
    thread::spawn(move || {
        let leased = leasing.session().map(|session| session.node_id());
        let _ = done_tx.send(leased.is_ok() || matches!(leased, Err(ClientError::Unavailable)));
    });
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    client.close();
}
