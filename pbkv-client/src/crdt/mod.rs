//! # Replicated Data Types
//!
//! Purpose: Stage local mutations of counters, sets and maps, ship them as one
//! update, and rebuild local state from what the server returns.
//!
//! ## Design Principles
//! 1. **Owned Tree**: A `Map` owns its nested maps, so a map can never contain
//!    one of its ancestors.
//! 2. **Server Is Authoritative**: After a commit the local value is replaced
//!    wholesale by the server's post-commit value.
//! 3. **Context Threading**: The opaque context from the last fetch rides on
//!    the next update and is cleared once that update is sent.
//! 4. **Override, Then Fill**: A caller-supplied raw request wins; generated
//!    defaults only fill fields it left unset.
//!
//! ## Commit Flow
//!
//! ```text
//! fetch ──► context + value
//!              │
//!   local edits (pending deltas, staged removals)
//!              │
//! commit ──► DtUpdateReq{context, op = pack()} ──► DtUpdateResp ──► replace
//! ```

mod counter;
mod map;
mod set;

pub use counter::Counter;
pub use map::Map;
pub use pbkv_common::messages::MapFieldType;
pub use set::Set;

use pbkv_common::messages::{DataType, DtFetchReq, DtOp, DtUpdateReq, DtUpdateResp, DtValue};
use pbkv_common::{OpCode, Response, WireError};
use tracing::debug;

use crate::bucket::BucketRef;
use crate::error::{ClientError, ClientResult};
use crate::session::{unexpected, Session};

/// Raw request overriding the generated defaults of the next operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DtRequest {
    Fetch(DtFetchReq),
    Update(DtUpdateReq),
}

impl DtRequest {
    fn name(&self) -> &'static str {
        match self {
            DtRequest::Fetch(_) => "DtFetchReq",
            DtRequest::Update(_) => "DtUpdateReq",
        }
    }
}

/// Data-type handle for one key.
///
/// At most one of the counter, set and map slots holds a value: the one
/// created with `new_*` or materialized by `fetch`.
pub struct Crdt<'a> {
    session: &'a mut Session,
    bucket: BucketRef,
    key: String,
    context: Option<Vec<u8>>,
    request: Option<DtRequest>,
    counter: Option<Counter>,
    set: Option<Set>,
    map: Option<Map>,
}

impl<'a> Crdt<'a> {
    pub(crate) fn new(session: &'a mut Session, bucket: BucketRef, key: String) -> Self {
        Crdt {
            session,
            bucket,
            key,
            context: None,
            request: None,
            counter: None,
            set: None,
            map: None,
        }
    }

    /// Overrides the request of the next `fetch` or `commit`.
    pub fn with_request(mut self, request: DtRequest) -> Self {
        self.request = Some(request);
        self
    }

    /// Same as [`Crdt::with_request`] for a handle already in use.
    pub fn set_request(&mut self, request: DtRequest) {
        self.request = Some(request);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Context from the last fetch, if it has not been used yet.
    pub fn context(&self) -> Option<&[u8]> {
        self.context.as_deref()
    }

    /// Type of the value currently held, if any.
    pub fn data_type(&self) -> Option<DataType> {
        if self.counter.is_some() {
            Some(DataType::Counter)
        } else if self.set.is_some() {
            Some(DataType::Set)
        } else if self.map.is_some() {
            Some(DataType::Map)
        } else {
            None
        }
    }

    /// Starts a fresh counter, replacing any current value.
    pub fn new_counter(&mut self) -> &mut Counter {
        self.clear_value();
        self.counter.insert(Counter::new())
    }

    pub fn new_set(&mut self) -> &mut Set {
        self.clear_value();
        self.set.insert(Set::new())
    }

    pub fn new_map(&mut self) -> &mut Map {
        self.clear_value();
        self.map.insert(Map::new())
    }

    pub fn counter(&self) -> Option<&Counter> {
        self.counter.as_ref()
    }

    pub fn counter_mut(&mut self) -> Option<&mut Counter> {
        self.counter.as_mut()
    }

    pub fn set(&self) -> Option<&Set> {
        self.set.as_ref()
    }

    pub fn set_mut(&mut self) -> Option<&mut Set> {
        self.set.as_mut()
    }

    pub fn map(&self) -> Option<&Map> {
        self.map.as_ref()
    }

    pub fn map_mut(&mut self) -> Option<&mut Map> {
        self.map.as_mut()
    }

    /// Fetches the value and remembers its context.
    ///
    /// The value takes the type the server reports; a missing key yields the
    /// empty value of that type.
    pub fn fetch(&mut self) -> ClientResult<DataType> {
        let mut req = match self.request.take() {
            None => DtFetchReq::default(),
            Some(DtRequest::Fetch(req)) => req,
            Some(other) => {
                return Err(ClientError::usage(format!(
                    "fetch expects DtFetchReq, got {}",
                    other.name()
                )))
            }
        };
        if req.bucket.is_empty() {
            req.bucket = self.bucket.name_bytes();
        }
        if req.key.is_empty() {
            req.key = self.key.as_bytes().to_vec();
        }
        if req.r#type.is_none() {
            req.r#type = Some(self.require_type()?);
        }

        let resp = match self.session.execute_message(OpCode::DtFetchReq, &req)? {
            Response::DtFetch(resp) => resp,
            other => return Err(unexpected(OpCode::DtFetchResp, &other)),
        };
        let kind = resp.data_type().ok_or(WireError::InvalidEnum {
            field: "DtFetchResp.type",
            value: resp.r#type,
        })?;
        // A missing key comes back typed but without a value.
        let value = resp.value.unwrap_or_default();
        self.materialize(kind, value);
        self.context = resp.context;
        debug!(key = %self.key, has_context = self.context.is_some(), "data type fetched");
        Ok(kind)
    }

    /// Sends every staged change as one update.
    ///
    /// The body is returned by default and replaces the local value. With
    /// `return_body = Some(false)` in an override, staged changes are folded
    /// into the local value instead.
    pub fn commit(&mut self) -> ClientResult<DtUpdateResp> {
        let op = self
            .pack()
            .ok_or_else(|| ClientError::usage("nothing to commit"))?;
        let mut req = match self.request.take() {
            None => DtUpdateReq::default(),
            Some(DtRequest::Update(req)) => req,
            Some(other) => {
                return Err(ClientError::usage(format!(
                    "commit expects DtUpdateReq, got {}",
                    other.name()
                )))
            }
        };
        if req.bucket.is_none() {
            req.bucket = Some(self.bucket.name_bytes());
        }
        if req.key.is_none() {
            req.key = Some(self.key.as_bytes().to_vec());
        }
        if req.r#type.is_none() {
            req.r#type = Some(self.require_type()?);
        }
        let context = self.context.take();
        if req.context.is_none() {
            req.context = context;
        }
        if req.return_body.is_none() {
            req.return_body = Some(true);
        }
        if req.op.is_none() {
            req.op = Some(op);
        }
        let return_body = req.return_body.unwrap_or(false);

        let resp = match self.session.execute_message(OpCode::DtUpdateReq, &req)? {
            Response::DtUpdate(resp) => resp,
            other => return Err(unexpected(OpCode::DtUpdateResp, &other)),
        };
        if return_body {
            self.replace(&resp);
        } else {
            self.fold_pending();
        }
        debug!(key = %self.key, return_body, "data type committed");
        Ok(resp)
    }

    fn clear_value(&mut self) {
        self.counter = None;
        self.set = None;
        self.map = None;
    }

    fn materialize(&mut self, kind: DataType, value: DtValue) {
        self.clear_value();
        match kind {
            DataType::Counter => {
                self.counter = Some(Counter::with_value(value.counter_value.unwrap_or(0)));
            }
            DataType::Set => self.set = Some(Set::from_wire(&value.set_value)),
            DataType::Map => self.map = Some(Map::from_entries(&value.map_value)),
        }
    }

    fn pack(&self) -> Option<DtOp> {
        if let Some(counter) = &self.counter {
            return Some(DtOp {
                counter_op: Some(counter.pack()),
                ..Default::default()
            });
        }
        if let Some(set) = &self.set {
            return Some(DtOp {
                set_op: Some(set.pack()),
                ..Default::default()
            });
        }
        self.map.as_ref().map(|map| DtOp {
            map_op: Some(map.pack()),
            ..Default::default()
        })
    }

    fn replace(&mut self, resp: &DtUpdateResp) {
        if let Some(counter) = self.counter.as_mut() {
            match resp.counter_value {
                Some(value) => counter.replace(value),
                None => counter.fold_pending(),
            }
        }
        if let Some(set) = self.set.as_mut() {
            set.replace(&resp.set_value);
        }
        if let Some(map) = self.map.as_mut() {
            map.unpack(&resp.map_value);
        }
    }

    fn fold_pending(&mut self) {
        if let Some(counter) = self.counter.as_mut() {
            counter.fold_pending();
        }
        if let Some(set) = self.set.as_mut() {
            set.fold_pending();
        }
        if let Some(map) = self.map.as_mut() {
            map.fold_pending();
        }
    }

    fn require_type(&self) -> ClientResult<Vec<u8>> {
        self.bucket
            .type_bytes()
            .ok_or_else(|| ClientError::usage("data type operations need a bucket type"))
    }
}
