//! Plain counters (op codes 50-53), the untyped predecessor of the counter
//! data type.

use pbkv_common::messages::{RpbCounterGetReq, RpbCounterUpdateReq};
use pbkv_common::{OpCode, Response};

use crate::bucket::BucketRef;
use crate::error::ClientResult;
use crate::session::{unexpected, Session};

pub struct PlainCounter<'a> {
    session: &'a mut Session,
    bucket: BucketRef,
    key: String,
}

impl<'a> PlainCounter<'a> {
    pub(crate) fn new(session: &'a mut Session, bucket: BucketRef, key: String) -> Self {
        PlainCounter {
            session,
            bucket,
            key,
        }
    }

    /// Adds `amount` (may be negative) and returns the new value.
    pub fn update(&mut self, amount: i64) -> ClientResult<Option<i64>> {
        self.update_with(RpbCounterUpdateReq {
            amount,
            returnvalue: Some(true),
            ..Default::default()
        })
    }

    pub fn update_with(&mut self, mut req: RpbCounterUpdateReq) -> ClientResult<Option<i64>> {
        if req.bucket.is_empty() {
            req.bucket = self.bucket.name_bytes();
        }
        if req.key.is_empty() {
            req.key = self.key.as_bytes().to_vec();
        }
        match self.session.execute_message(OpCode::CounterUpdateReq, &req)? {
            Response::CounterUpdate(resp) => Ok(resp.value),
            other => Err(unexpected(OpCode::CounterUpdateResp, &other)),
        }
    }

    /// Current value, or `None` if the counter does not exist.
    pub fn get(&mut self) -> ClientResult<Option<i64>> {
        self.get_with(RpbCounterGetReq::default())
    }

    pub fn get_with(&mut self, mut req: RpbCounterGetReq) -> ClientResult<Option<i64>> {
        if req.bucket.is_empty() {
            req.bucket = self.bucket.name_bytes();
        }
        if req.key.is_empty() {
            req.key = self.key.as_bytes().to_vec();
        }
        match self.session.execute_message(OpCode::CounterGetReq, &req)? {
            Response::CounterGet(resp) => Ok(resp.value),
            other => Err(unexpected(OpCode::CounterGetResp, &other)),
        }
    }
}
