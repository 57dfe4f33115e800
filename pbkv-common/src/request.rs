//! # Requests
//!
//! Purpose: The server half of the op-code table. Clients build request frames
//! with `Request::to_frame`; servers turn frames back into typed requests.

use crate::error::{WireError, WireResult};
use crate::frame::Frame;
use crate::messages::*;
use crate::opcode::OpCode;

/// Typed client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    GetClientId,
    SetClientId(RpbSetClientIdReq),
    GetServerInfo,
    Get(RpbGetReq),
    Put(RpbPutReq),
    Delete(RpbDelReq),
    ListBuckets(RpbListBucketsReq),
    ListKeys(RpbListKeysReq),
    GetBucket(RpbGetBucketReq),
    SetBucket(RpbSetBucketReq),
    ResetBucket(RpbResetBucketReq),
    GetBucketType(RpbGetBucketTypeReq),
    SetBucketType(RpbSetBucketTypeReq),
    ResetBucketType(RpbResetBucketTypeReq),
    MapRed(RpbMapRedReq),
    Index(RpbIndexReq),
    Search(RpbSearchQueryReq),
    CounterUpdate(RpbCounterUpdateReq),
    CounterGet(RpbCounterGetReq),
    DtFetch(DtFetchReq),
    DtUpdate(DtUpdateReq),
}

impl Request {
    /// Decodes a request frame. Response codes are rejected.
    pub fn decode(frame: &Frame) -> WireResult<Request> {
        let op = frame.op()?;
        let request = match op {
            OpCode::PingReq => Request::Ping,
            OpCode::GetClientIdReq => Request::GetClientId,
            OpCode::SetClientIdReq => Request::SetClientId(frame.parse("RpbSetClientIdReq")?),
            OpCode::GetServerInfoReq => Request::GetServerInfo,
            OpCode::GetReq => Request::Get(frame.parse("RpbGetReq")?),
            OpCode::PutReq => Request::Put(frame.parse("RpbPutReq")?),
            OpCode::DelReq => Request::Delete(frame.parse("RpbDelReq")?),
            OpCode::ListBucketsReq => Request::ListBuckets(frame.parse("RpbListBucketsReq")?),
            OpCode::ListKeysReq => Request::ListKeys(frame.parse("RpbListKeysReq")?),
            OpCode::GetBucketReq => Request::GetBucket(frame.parse("RpbGetBucketReq")?),
            OpCode::SetBucketReq => Request::SetBucket(frame.parse("RpbSetBucketReq")?),
            OpCode::ResetBucketReq => Request::ResetBucket(frame.parse("RpbResetBucketReq")?),
            OpCode::GetBucketTypeReq => {
                Request::GetBucketType(frame.parse("RpbGetBucketTypeReq")?)
            }
            OpCode::SetBucketTypeReq => {
                Request::SetBucketType(frame.parse("RpbSetBucketTypeReq")?)
            }
            OpCode::ResetBucketTypeReq => {
                Request::ResetBucketType(frame.parse("RpbResetBucketTypeReq")?)
            }
            OpCode::MapRedReq => Request::MapRed(frame.parse("RpbMapRedReq")?),
            OpCode::IndexReq => Request::Index(frame.parse("RpbIndexReq")?),
            OpCode::SearchQueryReq => Request::Search(frame.parse("RpbSearchQueryReq")?),
            OpCode::CounterUpdateReq => {
                Request::CounterUpdate(frame.parse("RpbCounterUpdateReq")?)
            }
            OpCode::CounterGetReq => Request::CounterGet(frame.parse("RpbCounterGetReq")?),
            OpCode::DtFetchReq => Request::DtFetch(frame.parse("DtFetchReq")?),
            OpCode::DtUpdateReq => Request::DtUpdate(frame.parse("DtUpdateReq")?),
            other => return Err(WireError::UnexpectedOpCode(other)),
        };
        Ok(request)
    }

    pub fn op(&self) -> OpCode {
        match self {
            Request::Ping => OpCode::PingReq,
            Request::GetClientId => OpCode::GetClientIdReq,
            Request::SetClientId(_) => OpCode::SetClientIdReq,
            Request::GetServerInfo => OpCode::GetServerInfoReq,
            Request::Get(_) => OpCode::GetReq,
            Request::Put(_) => OpCode::PutReq,
            Request::Delete(_) => OpCode::DelReq,
            Request::ListBuckets(_) => OpCode::ListBucketsReq,
            Request::ListKeys(_) => OpCode::ListKeysReq,
            Request::GetBucket(_) => OpCode::GetBucketReq,
            Request::SetBucket(_) => OpCode::SetBucketReq,
            Request::ResetBucket(_) => OpCode::ResetBucketReq,
            Request::GetBucketType(_) => OpCode::GetBucketTypeReq,
            Request::SetBucketType(_) => OpCode::SetBucketTypeReq,
            Request::ResetBucketType(_) => OpCode::ResetBucketTypeReq,
            Request::MapRed(_) => OpCode::MapRedReq,
            Request::Index(_) => OpCode::IndexReq,
            Request::Search(_) => OpCode::SearchQueryReq,
            Request::CounterUpdate(_) => OpCode::CounterUpdateReq,
            Request::CounterGet(_) => OpCode::CounterGetReq,
            Request::DtFetch(_) => OpCode::DtFetchReq,
            Request::DtUpdate(_) => OpCode::DtUpdateReq,
        }
    }

    pub fn name(&self) -> &'static str {
        self.op().name()
    }

    /// Encodes the request into a frame.
    pub fn to_frame(&self) -> Frame {
        let op = self.op();
        match self {
            Request::Ping | Request::GetClientId | Request::GetServerInfo => Frame::empty(op),
            Request::SetClientId(msg) => Frame::message(op, msg),
            Request::Get(msg) => Frame::message(op, msg),
            Request::Put(msg) => Frame::message(op, msg),
            Request::Delete(msg) => Frame::message(op, msg),
            Request::ListBuckets(msg) => Frame::message(op, msg),
            Request::ListKeys(msg) => Frame::message(op, msg),
            Request::GetBucket(msg) => Frame::message(op, msg),
            Request::SetBucket(msg) => Frame::message(op, msg),
            Request::ResetBucket(msg) => Frame::message(op, msg),
            Request::GetBucketType(msg) => Frame::message(op, msg),
            Request::SetBucketType(msg) => Frame::message(op, msg),
            Request::ResetBucketType(msg) => Frame::message(op, msg),
            Request::MapRed(msg) => Frame::message(op, msg),
            Request::Index(msg) => Frame::message(op, msg),
            Request::Search(msg) => Frame::message(op, msg),
            Request::CounterUpdate(msg) => Frame::message(op, msg),
            Request::CounterGet(msg) => Frame::message(op, msg),
            Request::DtFetch(msg) => Frame::message(op, msg),
            Request::DtUpdate(msg) => Frame::message(op, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_request_survives_frame() {
        let req = Request::Put(RpbPutReq {
            bucket: b"b".to_vec(),
            key: Some(b"k".to_vec()),
            content: Some(RpbContent {
                value: b"v".to_vec(),
                content_type: Some(b"text/plain".to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let frame = req.to_frame();
        assert_eq!(frame.code, OpCode::PutReq.as_u8());
        assert_eq!(Request::decode(&frame).unwrap(), req);
    }

    #[test]
    fn response_code_is_unexpected() {
        let frame = Frame::empty(OpCode::PingResp);
        assert!(matches!(
            Request::decode(&frame),
            Err(WireError::UnexpectedOpCode(OpCode::PingResp))
        ));
    }

    #[test]
    fn bucket_type_requests_share_response_codes() {
        let req = Request::GetBucketType(RpbGetBucketTypeReq {
            r#type: b"maps".to_vec(),
        });
        assert_eq!(req.op().as_u8(), 31);
        assert_eq!(Request::decode(&req.to_frame()).unwrap(), req);
    }
}
