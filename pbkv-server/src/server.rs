//! # TCP Server
//!
//! Accept protobuf connections, split the byte stream into envelopes, and
//! answer each request with one or more response frames.
//!
//! ## Design Principles
//! 1. **Task Per Connection**: Every accepted socket gets its own tokio task
//!    and its own read and write buffers.
//! 2. **Errors Are Replies**: A request the store rejects is answered with an
//!    error frame and the connection stays open. Only a broken envelope
//!    closes it.
//! 3. **Streams As Frame Lists**: Streaming answers are built up front as a
//!    list of frames whose last member is marked `done`.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use pbkv_common::messages::{
    RpbCounterGetResp, RpbCounterUpdateResp, RpbGetBucketResp, RpbGetClientIdResp,
    RpbGetServerInfoResp, RpbIndexReq, RpbIndexResp, RpbListBucketsResp, RpbListKeysResp,
    RpbMapRedResp, RpbPair,
};
use pbkv_common::{Frame, RemoteError, Request, Response};

use crate::store::StoreResult;
use crate::ServerState;

/// Error code carried by every error reply.
const ERROR_CODE: u32 = 0;

/// Per-connection state.
struct Connection {
    client_id: Vec<u8>,
}

/// Accepts connections until `shutdown` fires or its sender is dropped.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown: oneshot::Receiver<()>,
) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    state.metrics.record_connection_open();
                    debug!(%peer, "connection opened");
                    if let Err(err) = handle_connection(stream, Arc::clone(&state)).await {
                        debug!(%peer, error = %err, "connection ended with error");
                    }
                    state.metrics.record_connection_close();
                });
            }
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

/// Handles a single TCP client connection.
pub async fn handle_connection(mut stream: TcpStream, state: Arc<ServerState>) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let mut read_buf = BytesMut::with_capacity(8 * 1024);
    let mut write_buf = BytesMut::with_capacity(8 * 1024);
    let mut conn = Connection {
        client_id: state.next_client_id(),
    };

    loop {
        let bytes = stream.read_buf(&mut read_buf).await?;
        if bytes == 0 {
            break;
        }

        loop {
            match Frame::decode(&mut read_buf) {
                Ok(Some(frame)) => {
                    let started = Instant::now();
                    state.metrics.record_request_start();
                    for reply in dispatch(&frame, &state, &mut conn) {
                        if matches!(reply, Response::Error(_)) {
                            state.metrics.record_error();
                        }
                        reply.to_frame().encode(&mut write_buf);
                    }
                    let written = stream.write_all(&write_buf).await;
                    write_buf.clear();
                    state.metrics.record_request_end(started.elapsed());
                    written?;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "undecodable envelope, closing connection");
                    state.metrics.record_error();
                    error_reply(err.to_string()).to_frame().encode(&mut write_buf);
                    stream.write_all(&write_buf).await?;
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

fn dispatch(frame: &Frame, state: &ServerState, conn: &mut Connection) -> Vec<Response> {
    let request = match Request::decode(frame) {
        Ok(request) => request,
        Err(err) => {
            debug!(code = frame.code, error = %err, "rejected frame");
            return vec![error_reply(err.to_string())];
        }
    };
    let name = request.name();
    match execute(request, state, conn) {
        Ok(replies) => replies,
        Err(message) => {
            debug!(request = name, error = %message, "request failed");
            vec![error_reply(message)]
        }
    }
}

fn execute(request: Request, state: &ServerState, conn: &mut Connection) -> StoreResult<Vec<Response>> {
    let store = &state.store;
    let reply = match request {
        Request::Ping => Response::Ping,
        Request::GetClientId => Response::ClientId(RpbGetClientIdResp {
            client_id: conn.client_id.clone(),
        }),
        Request::SetClientId(req) => {
            conn.client_id = req.client_id;
            Response::SetClientId
        }
        Request::GetServerInfo => Response::ServerInfo(RpbGetServerInfoResp {
            node: Some(state.config.node_name.as_bytes().to_vec()),
            server_version: Some(env!("CARGO_PKG_VERSION").as_bytes().to_vec()),
        }),
        Request::Get(req) => Response::Get(store.get(&req)),
        Request::Put(req) => Response::Put(store.put(&req)?),
        Request::Delete(req) => {
            store.delete(&req);
            Response::Delete
        }
        Request::ListBuckets(req) => Response::ListBuckets(RpbListBucketsResp {
            buckets: store.list_buckets(req.r#type.as_deref()),
            done: Some(true),
        }),
        Request::ListKeys(req) => {
            let keys = store.list_keys(req.r#type.as_deref(), &req.bucket);
            let mut replies: Vec<Response> = keys
                .chunks(state.config.chunk_size())
                .map(|chunk| {
                    Response::ListKeys(RpbListKeysResp {
                        keys: chunk.to_vec(),
                        done: None,
                    })
                })
                .collect();
            replies.push(Response::ListKeys(RpbListKeysResp {
                keys: Vec::new(),
                done: Some(true),
            }));
            return Ok(replies);
        }
        Request::GetBucket(req) => Response::GetBucket(RpbGetBucketResp {
            props: Some(store.bucket_props(req.r#type.as_deref(), &req.bucket)),
        }),
        Request::SetBucket(req) => {
            let props = req.props.unwrap_or_default();
            store.set_bucket_props(req.r#type.as_deref(), &req.bucket, &props);
            Response::SetBucket
        }
        Request::ResetBucket(req) => {
            store.reset_bucket_props(req.r#type.as_deref(), &req.bucket);
            Response::ResetBucket
        }
        Request::GetBucketType(req) => Response::GetBucket(RpbGetBucketResp {
            props: Some(store.type_props(Some(req.r#type.as_slice()))),
        }),
        Request::SetBucketType(req) => {
            store.set_type_props(&req.r#type, &req.props.unwrap_or_default());
            Response::SetBucket
        }
        Request::ResetBucketType(req) => {
            store.reset_type_props(&req.r#type);
            Response::ResetBucket
        }
        // No job engine: phase 0 echoes the job document back.
        Request::MapRed(req) => {
            return Ok(vec![
                Response::MapRed(RpbMapRedResp {
                    phase: Some(0),
                    response: Some(req.request),
                    done: None,
                }),
                Response::MapRed(RpbMapRedResp {
                    done: Some(true),
                    ..Default::default()
                }),
            ]);
        }
        Request::Index(req) => return index(store.index(&req)?, &req, state.config.chunk_size()),
        Request::Search(req) => Response::Search(store.search(&req)),
        Request::CounterUpdate(req) => {
            let value = store.counter_update(&req.bucket, &req.key, req.amount);
            Response::CounterUpdate(RpbCounterUpdateResp {
                value: req.returnvalue.unwrap_or(false).then_some(value),
            })
        }
        Request::CounterGet(req) => Response::CounterGet(RpbCounterGetResp {
            value: store.counter_get(&req.bucket, &req.key),
        }),
        Request::DtFetch(req) => Response::DtFetch(store.dt_fetch(&req)?),
        Request::DtUpdate(req) => Response::DtUpdate(store.dt_update(&req)?),
    };
    Ok(vec![reply])
}

fn index(hits: Vec<(Vec<u8>, Vec<u8>)>, req: &RpbIndexReq, chunk: usize) -> StoreResult<Vec<Response>> {
    let return_terms = req.return_terms.unwrap_or(false);
    let page = |hits: &[(Vec<u8>, Vec<u8>)]| {
        let mut resp = RpbIndexResp::default();
        if return_terms {
            resp.results = hits
                .iter()
                .map(|(term, key)| RpbPair {
                    key: term.clone(),
                    value: Some(key.clone()),
                })
                .collect();
        } else {
            resp.keys = hits.iter().map(|(_, key)| key.clone()).collect();
        }
        resp
    };

    if !req.is_streaming() {
        return Ok(vec![Response::Index(page(&hits))]);
    }
    let mut replies: Vec<Response> = hits
        .chunks(chunk)
        .map(|hits| Response::Index(page(hits)))
        .collect();
    replies.push(Response::Index(RpbIndexResp {
        done: Some(true),
        ..Default::default()
    }));
    Ok(replies)
}

fn error_reply(message: String) -> Response {
    Response::Error(RemoteError {
        code: ERROR_CODE,
        message,
    })
}
