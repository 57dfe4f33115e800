//! # Session
//!
//! Purpose: A caller's exclusive lease on one pooled node, plus the execute
//! primitives every request builder is written against.
//!
//! ## Design Principles
//! 1. **RAII Lease**: The node goes back to the pool when the session is
//!    released or dropped.
//! 2. **Errors Are Values**: A server error reply surfaces as
//!    `ClientError::Remote`; callers never see `Response::Error`.
//! 3. **Thin Facade**: Entity-specific calls live in `Bucket`, `Object`,
//!    `PlainCounter`, `Query` and `Crdt`, each borrowing the session.

use std::sync::Arc;

use bytes::Bytes;
use pbkv_common::messages::{RpbGetServerInfoResp, RpbListBucketsReq, RpbSetClientIdReq};
use pbkv_common::{Frame, OpCode, Response};

use crate::bucket::Bucket;
use crate::client::Shared;
use crate::error::{ClientError, ClientResult};
use crate::node::Node;
use crate::query::Query;

/// Exclusive lease on one node.
pub struct Session {
    shared: Arc<Shared>,
    node: Option<Node>,
}

impl Session {
    pub(crate) fn new(shared: Arc<Shared>, node: Node) -> Self {
        Session {
            shared,
            node: Some(node),
        }
    }

    fn node(&mut self) -> ClientResult<&mut Node> {
        self.node.as_mut().ok_or(ClientError::Closed)
    }

    /// Id of the leased node.
    pub fn node_id(&self) -> Option<usize> {
        self.node.as_ref().map(Node::id)
    }

    /// Address of the leased node.
    pub fn addr(&self) -> Option<&str> {
        self.node.as_ref().map(Node::addr)
    }

    /// Sends `(op, payload)` and returns the decoded response.
    pub fn execute(&mut self, op: OpCode, payload: impl Into<Bytes>) -> ClientResult<Response> {
        self.execute_frame(&Frame::new(op, payload))
    }

    /// Encodes `message` under `op` and executes it.
    pub fn execute_message<M: prost::Message>(
        &mut self,
        op: OpCode,
        message: &M,
    ) -> ClientResult<Response> {
        self.execute_frame(&Frame::message(op, message))
    }

    pub fn execute_frame(&mut self, frame: &Frame) -> ClientResult<Response> {
        let response = self.node()?.execute(frame)?;
        Ok(response.into_result()?)
    }

    /// Sends a frame without reading a reply; used to open a stream.
    pub fn send(&mut self, frame: &Frame) -> ClientResult<()> {
        self.node()?.write(frame)
    }

    /// Reads the next frame of an in-progress stream.
    pub fn execute_continuation(&mut self) -> ClientResult<Response> {
        let response = self.node()?.read_response()?;
        Ok(response.into_result()?)
    }

    pub fn ping(&mut self) -> ClientResult<()> {
        match self.execute(OpCode::PingReq, Bytes::new())? {
            Response::Ping => Ok(()),
            other => Err(unexpected(OpCode::PingResp, &other)),
        }
    }

    /// Client id the server associates with this connection.
    pub fn client_id(&mut self) -> ClientResult<Vec<u8>> {
        match self.execute(OpCode::GetClientIdReq, Bytes::new())? {
            Response::ClientId(resp) => Ok(resp.client_id),
            other => Err(unexpected(OpCode::GetClientIdResp, &other)),
        }
    }

    pub fn set_client_id(&mut self, client_id: &[u8]) -> ClientResult<()> {
        let req = RpbSetClientIdReq {
            client_id: client_id.to_vec(),
        };
        match self.execute_message(OpCode::SetClientIdReq, &req)? {
            Response::SetClientId => Ok(()),
            other => Err(unexpected(OpCode::SetClientIdResp, &other)),
        }
    }

    pub fn server_info(&mut self) -> ClientResult<RpbGetServerInfoResp> {
        match self.execute(OpCode::GetServerInfoReq, Bytes::new())? {
            Response::ServerInfo(resp) => Ok(resp),
            other => Err(unexpected(OpCode::GetServerInfoResp, &other)),
        }
    }

    /// Names of every bucket, optionally restricted to one bucket type.
    pub fn list_buckets(&mut self, bucket_type: Option<&str>) -> ClientResult<Vec<Vec<u8>>> {
        let req = RpbListBucketsReq {
            r#type: bucket_type.map(|t| t.as_bytes().to_vec()),
            ..Default::default()
        };
        match self.execute_message(OpCode::ListBucketsReq, &req)? {
            Response::ListBuckets(resp) => Ok(resp.buckets),
            other => Err(unexpected(OpCode::ListBucketsResp, &other)),
        }
    }

    /// Request builder for one bucket.
    pub fn bucket(&mut self, name: impl Into<String>) -> Bucket<'_> {
        Bucket::new(self, name.into())
    }

    /// Builder for map-reduce, secondary-index and search queries.
    pub fn query(&mut self) -> Query<'_> {
        Query::new(self)
    }

    /// Returns the node to the pool.
    pub fn release(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            self.shared.pool.release(node);
        }
    }
}

/// Error for a well-formed response of the wrong kind.
pub(crate) fn unexpected(expected: OpCode, actual: &Response) -> ClientError {
    ClientError::UnexpectedResponse {
        expected: expected.name(),
        actual: actual.name(),
    }
}
