//! Key/value object requests.
//!
//! An `Object` remembers the vector clock of its last fetch or store and sends
//! it with the next store or delete unless the caller's request sets one.

use pbkv_common::messages::{RpbContent, RpbDelReq, RpbGetReq, RpbGetResp, RpbPutReq, RpbPutResp};
use pbkv_common::{OpCode, Response};

use crate::bucket::BucketRef;
use crate::error::{ClientError, ClientResult};
use crate::session::{unexpected, Session};

pub struct Object<'a> {
    session: &'a mut Session,
    bucket: BucketRef,
    key: String,
    content_type: Option<String>,
    vclock: Option<Vec<u8>>,
}

impl<'a> Object<'a> {
    pub(crate) fn new(session: &'a mut Session, bucket: BucketRef, key: String) -> Self {
        Object {
            session,
            bucket,
            key,
            content_type: None,
            vclock: None,
        }
    }

    /// Content type attached to values written by `store`.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Vector clock from the last fetch or store.
    pub fn vclock(&self) -> Option<&[u8]> {
        self.vclock.as_deref()
    }

    pub fn fetch(&mut self) -> ClientResult<RpbGetResp> {
        self.fetch_with(RpbGetReq::default())
    }

    /// Fetches with caller-chosen options; bucket, key and type are filled in
    /// where the request leaves them empty.
    pub fn fetch_with(&mut self, mut req: RpbGetReq) -> ClientResult<RpbGetResp> {
        if req.bucket.is_empty() {
            req.bucket = self.bucket.name_bytes();
        }
        if req.key.is_empty() {
            req.key = self.key.as_bytes().to_vec();
        }
        if req.r#type.is_none() {
            req.r#type = self.bucket.type_bytes();
        }
        match self.session.execute_message(OpCode::GetReq, &req)? {
            Response::Get(resp) => {
                if resp.vclock.is_some() {
                    self.vclock = resp.vclock.clone();
                }
                Ok(resp)
            }
            other => Err(unexpected(OpCode::GetResp, &other)),
        }
    }

    /// Stores `value` under the object's key.
    pub fn store(&mut self, value: &[u8]) -> ClientResult<RpbPutResp> {
        let content = RpbContent {
            value: value.to_vec(),
            content_type: self.content_type.as_ref().map(|ct| ct.as_bytes().to_vec()),
            ..Default::default()
        };
        self.store_with(RpbPutReq {
            content: Some(content),
            ..Default::default()
        })
    }

    /// Stores with caller-chosen options. The request must carry content.
    pub fn store_with(&mut self, mut req: RpbPutReq) -> ClientResult<RpbPutResp> {
        if req.content.is_none() {
            return Err(ClientError::usage("put request carries no content"));
        }
        if req.bucket.is_empty() {
            req.bucket = self.bucket.name_bytes();
        }
        if req.key.is_none() {
            req.key = Some(self.key.as_bytes().to_vec());
        }
        if req.r#type.is_none() {
            req.r#type = self.bucket.type_bytes();
        }
        if req.vclock.is_none() {
            req.vclock = self.vclock.clone();
        }
        match self.session.execute_message(OpCode::PutReq, &req)? {
            Response::Put(resp) => {
                if resp.vclock.is_some() {
                    self.vclock = resp.vclock.clone();
                }
                Ok(resp)
            }
            other => Err(unexpected(OpCode::PutResp, &other)),
        }
    }

    pub fn delete(&mut self) -> ClientResult<bool> {
        self.delete_with(RpbDelReq::default())
    }

    /// Deletes with caller-chosen options. Returns true once acknowledged.
    pub fn delete_with(&mut self, mut req: RpbDelReq) -> ClientResult<bool> {
        if req.bucket.is_empty() {
            req.bucket = self.bucket.name_bytes();
        }
        if req.key.is_empty() {
            req.key = self.key.as_bytes().to_vec();
        }
        if req.r#type.is_none() {
            req.r#type = self.bucket.type_bytes();
        }
        if req.vclock.is_none() {
            req.vclock = self.vclock.clone();
        }
        match self.session.execute_message(OpCode::DelReq, &req)? {
            Response::Delete => {
                self.vclock = None;
                Ok(true)
            }
            other => Err(unexpected(OpCode::DelResp, &other)),
        }
    }
}
