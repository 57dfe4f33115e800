//! Map-reduce, secondary-index and search queries.

use pbkv_common::messages::{
    RpbIndexReq, RpbIndexResp, RpbMapRedReq, RpbMapRedResp, RpbSearchQueryReq,
    RpbSearchQueryResp,
};
use pbkv_common::{Frame, OpCode, Response};

use crate::error::ClientResult;
use crate::session::{unexpected, Session};
use crate::stream::{StreamCall, StreamState};

/// Query builder. Each streaming query kind keeps its own stream state.
pub struct Query<'a> {
    session: &'a mut Session,
    map_reduce: StreamCall,
    index: StreamCall,
}

impl<'a> Query<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        Query {
            session,
            map_reduce: StreamCall::new(),
            index: StreamCall::new(),
        }
    }

    /// Next partial result of a map-reduce job. Call until done.
    ///
    /// `request` is the job document in `content_type` encoding; it is only
    /// sent on the first call of a sequence.
    pub fn map_reduce(&mut self, request: &[u8], content_type: &str) -> ClientResult<RpbMapRedResp> {
        self.map_reduce.next(self.session, || {
            Frame::message(
                OpCode::MapRedReq,
                &RpbMapRedReq {
                    request: request.to_vec(),
                    content_type: content_type.as_bytes().to_vec(),
                },
            )
        })
    }

    /// Secondary-index query.
    ///
    /// With `stream` set, each call returns the next partial result until one
    /// reports done; otherwise the whole result arrives in one call.
    pub fn secondary_index(&mut self, req: RpbIndexReq) -> ClientResult<RpbIndexResp> {
        if req.is_streaming() {
            return self
                .index
                .next(self.session, || Frame::message(OpCode::IndexReq, &req));
        }
        match self.session.execute_message(OpCode::IndexReq, &req)? {
            Response::Index(resp) => Ok(resp),
            other => Err(unexpected(OpCode::IndexResp, &other)),
        }
    }

    /// Full-text search with default options.
    pub fn search(&mut self, index: &str, q: &str) -> ClientResult<RpbSearchQueryResp> {
        self.search_with(RpbSearchQueryReq {
            q: q.as_bytes().to_vec(),
            index: index.as_bytes().to_vec(),
            ..Default::default()
        })
    }

    pub fn search_with(&mut self, req: RpbSearchQueryReq) -> ClientResult<RpbSearchQueryResp> {
        match self.session.execute_message(OpCode::SearchQueryReq, &req)? {
            Response::Search(resp) => Ok(resp),
            other => Err(unexpected(OpCode::SearchQueryResp, &other)),
        }
    }

    pub fn map_reduce_state(&self) -> StreamState {
        self.map_reduce.state()
    }

    pub fn index_state(&self) -> StreamState {
        self.index.state()
    }
}
