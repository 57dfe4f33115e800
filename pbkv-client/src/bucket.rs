//! Bucket-level requests: key listing, bucket and bucket-type properties, and
//! the entry points to objects, counters and data types.

use pbkv_common::messages::{
    RpbBucketProps, RpbGetBucketReq, RpbGetBucketTypeReq, RpbListKeysReq, RpbListKeysResp,
    RpbResetBucketReq, RpbResetBucketTypeReq, RpbSetBucketReq, RpbSetBucketTypeReq,
};
use pbkv_common::{Frame, OpCode, Response};

use crate::counter::PlainCounter;
use crate::crdt::Crdt;
use crate::error::{ClientError, ClientResult};
use crate::object::Object;
use crate::session::{unexpected, Session};
use crate::stream::{StreamCall, StreamFrame, StreamState};

/// Bucket name plus optional bucket type, as carried in requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    pub name: String,
    pub bucket_type: Option<String>,
}

impl BucketRef {
    pub(crate) fn name_bytes(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    pub(crate) fn type_bytes(&self) -> Option<Vec<u8>> {
        self.bucket_type.as_ref().map(|t| t.as_bytes().to_vec())
    }
}

/// Requests scoped to one bucket.
pub struct Bucket<'a> {
    session: &'a mut Session,
    target: BucketRef,
    list_keys: StreamCall,
}

impl<'a> Bucket<'a> {
    pub(crate) fn new(session: &'a mut Session, name: String) -> Self {
        Bucket {
            session,
            target: BucketRef {
                name,
                bucket_type: None,
            },
            list_keys: StreamCall::new(),
        }
    }

    /// Declares the bucket type sent with typed requests.
    pub fn with_type(mut self, bucket_type: impl Into<String>) -> Self {
        self.target.bucket_type = Some(bucket_type.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    pub fn bucket_type(&self) -> Option<&str> {
        self.target.bucket_type.as_deref()
    }

    /// Next partial key listing. Call until the returned frame is done.
    pub fn list_keys(&mut self) -> ClientResult<RpbListKeysResp> {
        let target = &self.target;
        self.list_keys.next(self.session, || {
            Frame::message(
                OpCode::ListKeysReq,
                &RpbListKeysReq {
                    bucket: target.name_bytes(),
                    r#type: target.type_bytes(),
                    ..Default::default()
                },
            )
        })
    }

    /// Drains a whole key listing.
    pub fn all_keys(&mut self) -> ClientResult<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        loop {
            let frame = self.list_keys()?;
            let done = frame.is_done();
            keys.extend(frame.keys);
            if done {
                return Ok(keys);
            }
        }
    }

    /// State of the key-listing stream.
    pub fn list_keys_state(&self) -> StreamState {
        self.list_keys.state()
    }

    pub fn props(&mut self) -> ClientResult<RpbBucketProps> {
        let req = RpbGetBucketReq {
            bucket: self.target.name_bytes(),
            r#type: self.target.type_bytes(),
        };
        match self.session.execute_message(OpCode::GetBucketReq, &req)? {
            Response::GetBucket(resp) => Ok(resp.props.unwrap_or_default()),
            other => Err(unexpected(OpCode::GetBucketResp, &other)),
        }
    }

    pub fn set_props(&mut self, props: RpbBucketProps) -> ClientResult<()> {
        let req = RpbSetBucketReq {
            bucket: self.target.name_bytes(),
            props: Some(props),
            r#type: self.target.type_bytes(),
        };
        match self.session.execute_message(OpCode::SetBucketReq, &req)? {
            Response::SetBucket => Ok(()),
            other => Err(unexpected(OpCode::SetBucketResp, &other)),
        }
    }

    /// Restores the bucket's properties to its type's defaults.
    pub fn reset_props(&mut self) -> ClientResult<()> {
        let req = RpbResetBucketReq {
            bucket: self.target.name_bytes(),
            r#type: self.target.type_bytes(),
        };
        match self.session.execute_message(OpCode::ResetBucketReq, &req)? {
            Response::ResetBucket => Ok(()),
            other => Err(unexpected(OpCode::ResetBucketResp, &other)),
        }
    }

    /// Properties of the declared bucket type.
    pub fn type_props(&mut self) -> ClientResult<RpbBucketProps> {
        let req = RpbGetBucketTypeReq {
            r#type: self.require_type()?,
        };
        match self.session.execute_message(OpCode::GetBucketTypeReq, &req)? {
            Response::GetBucket(resp) => Ok(resp.props.unwrap_or_default()),
            other => Err(unexpected(OpCode::GetBucketResp, &other)),
        }
    }

    pub fn set_type_props(&mut self, props: RpbBucketProps) -> ClientResult<()> {
        let req = RpbSetBucketTypeReq {
            r#type: self.require_type()?,
            props: Some(props),
        };
        match self.session.execute_message(OpCode::SetBucketTypeReq, &req)? {
            Response::SetBucket => Ok(()),
            other => Err(unexpected(OpCode::SetBucketResp, &other)),
        }
    }

    pub fn reset_type(&mut self) -> ClientResult<()> {
        let req = RpbResetBucketTypeReq {
            r#type: self.require_type()?,
        };
        match self.session.execute_message(OpCode::ResetBucketTypeReq, &req)? {
            Response::ResetBucket => Ok(()),
            other => Err(unexpected(OpCode::ResetBucketResp, &other)),
        }
    }

    pub fn object(&mut self, key: impl Into<String>) -> Object<'_> {
        Object::new(self.session, self.target.clone(), key.into())
    }

    /// Plain (non-typed) counter stored under `key`.
    pub fn counter(&mut self, key: impl Into<String>) -> PlainCounter<'_> {
        PlainCounter::new(self.session, self.target.clone(), key.into())
    }

    /// Replicated data type stored under `key`.
    pub fn crdt(&mut self, key: impl Into<String>) -> Crdt<'_> {
        Crdt::new(self.session, self.target.clone(), key.into())
    }

    fn require_type(&self) -> ClientResult<Vec<u8>> {
        self.target
            .type_bytes()
            .ok_or_else(|| ClientError::usage("bucket has no declared type"))
    }
}
