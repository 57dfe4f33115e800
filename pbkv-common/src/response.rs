//! # Responses
//!
//! Purpose: Turn a server frame into a typed response, the client half of the
//! op-code table.
//!
//! ## Design Principles
//! 1. **Closed Dispatch**: One `match` over `OpCode`; there is no registry.
//! 2. **Errors Are Responses**: Op code 0 decodes into `Response::Error`
//!    carrying a structured `RemoteError`.
//! 3. **Acks Are Units**: Boolean-ack codes decode without reading the payload.
//! 4. **Wrong Side Is Loud**: A request code arriving at a client is reported
//!    as `UnexpectedOpCode`, never ignored.

use crate::error::{RemoteError, WireError, WireResult};
use crate::frame::Frame;
use crate::messages::*;
use crate::opcode::OpCode;

/// Typed server reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Error(RemoteError),
    Ping,
    ClientId(RpbGetClientIdResp),
    SetClientId,
    ServerInfo(RpbGetServerInfoResp),
    Get(RpbGetResp),
    Put(RpbPutResp),
    Delete,
    ListBuckets(RpbListBucketsResp),
    ListKeys(RpbListKeysResp),
    GetBucket(RpbGetBucketResp),
    SetBucket,
    MapRed(RpbMapRedResp),
    Index(RpbIndexResp),
    Search(RpbSearchQueryResp),
    ResetBucket,
    CounterUpdate(RpbCounterUpdateResp),
    CounterGet(RpbCounterGetResp),
    DtFetch(DtFetchResp),
    DtUpdate(DtUpdateResp),
}

impl Response {
    /// Decodes a response frame.
    pub fn decode(frame: &Frame) -> WireResult<Response> {
        let op = frame.op()?;
        let response = match op {
            OpCode::ErrorResp => {
                let err: RpbErrorResp = frame.parse("RpbErrorResp")?;
                Response::Error(RemoteError {
                    code: err.errcode,
                    message: String::from_utf8_lossy(&err.errmsg).into_owned(),
                })
            }
            OpCode::PingResp => Response::Ping,
            OpCode::GetClientIdResp => Response::ClientId(frame.parse("RpbGetClientIdResp")?),
            OpCode::SetClientIdResp => Response::SetClientId,
            OpCode::GetServerInfoResp => {
                Response::ServerInfo(frame.parse("RpbGetServerInfoResp")?)
            }
            OpCode::GetResp => Response::Get(frame.parse("RpbGetResp")?),
            OpCode::PutResp => Response::Put(frame.parse("RpbPutResp")?),
            OpCode::DelResp => Response::Delete,
            OpCode::ListBucketsResp => Response::ListBuckets(frame.parse("RpbListBucketsResp")?),
            OpCode::ListKeysResp => Response::ListKeys(frame.parse("RpbListKeysResp")?),
            OpCode::GetBucketResp => Response::GetBucket(frame.parse("RpbGetBucketResp")?),
            OpCode::SetBucketResp => Response::SetBucket,
            OpCode::MapRedResp => Response::MapRed(frame.parse("RpbMapRedResp")?),
            OpCode::IndexResp => Response::Index(frame.parse("RpbIndexResp")?),
            OpCode::SearchQueryResp => Response::Search(frame.parse("RpbSearchQueryResp")?),
            OpCode::ResetBucketResp => Response::ResetBucket,
            OpCode::CounterUpdateResp => {
                Response::CounterUpdate(frame.parse("RpbCounterUpdateResp")?)
            }
            OpCode::CounterGetResp => Response::CounterGet(frame.parse("RpbCounterGetResp")?),
            OpCode::DtFetchResp => Response::DtFetch(frame.parse("DtFetchResp")?),
            OpCode::DtUpdateResp => Response::DtUpdate(frame.parse("DtUpdateResp")?),
            other => return Err(WireError::UnexpectedOpCode(other)),
        };
        Ok(response)
    }

    /// Op code this response travels under.
    pub fn op(&self) -> OpCode {
        match self {
            Response::Error(_) => OpCode::ErrorResp,
            Response::Ping => OpCode::PingResp,
            Response::ClientId(_) => OpCode::GetClientIdResp,
            Response::SetClientId => OpCode::SetClientIdResp,
            Response::ServerInfo(_) => OpCode::GetServerInfoResp,
            Response::Get(_) => OpCode::GetResp,
            Response::Put(_) => OpCode::PutResp,
            Response::Delete => OpCode::DelResp,
            Response::ListBuckets(_) => OpCode::ListBucketsResp,
            Response::ListKeys(_) => OpCode::ListKeysResp,
            Response::GetBucket(_) => OpCode::GetBucketResp,
            Response::SetBucket => OpCode::SetBucketResp,
            Response::MapRed(_) => OpCode::MapRedResp,
            Response::Index(_) => OpCode::IndexResp,
            Response::Search(_) => OpCode::SearchQueryResp,
            Response::ResetBucket => OpCode::ResetBucketResp,
            Response::CounterUpdate(_) => OpCode::CounterUpdateResp,
            Response::CounterGet(_) => OpCode::CounterGetResp,
            Response::DtFetch(_) => OpCode::DtFetchResp,
            Response::DtUpdate(_) => OpCode::DtUpdateResp,
        }
    }

    /// Message name, used in error reports.
    pub fn name(&self) -> &'static str {
        self.op().name()
    }

    /// Splits a server error reply from every other response.
    pub fn into_result(self) -> Result<Response, RemoteError> {
        match self {
            Response::Error(err) => Err(err),
            other => Ok(other),
        }
    }

    /// Encodes the response into a frame.
    pub fn to_frame(&self) -> Frame {
        let op = self.op();
        match self {
            Response::Error(err) => Frame::message(
                op,
                &RpbErrorResp {
                    errmsg: err.message.as_bytes().to_vec(),
                    errcode: err.code,
                },
            ),
            Response::Ping
            | Response::SetClientId
            | Response::Delete
            | Response::SetBucket
            | Response::ResetBucket => Frame::empty(op),
            Response::ClientId(msg) => Frame::message(op, msg),
            Response::ServerInfo(msg) => Frame::message(op, msg),
            Response::Get(msg) => Frame::message(op, msg),
            Response::Put(msg) => Frame::message(op, msg),
            Response::ListBuckets(msg) => Frame::message(op, msg),
            Response::ListKeys(msg) => Frame::message(op, msg),
            Response::GetBucket(msg) => Frame::message(op, msg),
            Response::MapRed(msg) => Frame::message(op, msg),
            Response::Index(msg) => Frame::message(op, msg),
            Response::Search(msg) => Frame::message(op, msg),
            Response::CounterUpdate(msg) => Frame::message(op, msg),
            Response::CounterGet(msg) => Frame::message(op, msg),
            Response::DtFetch(msg) => Frame::message(op, msg),
            Response::DtUpdate(msg) => Frame::message(op, msg),
        }
    }
}
