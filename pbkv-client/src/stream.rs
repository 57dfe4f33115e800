//! # Streaming Calls
//!
//! Purpose: Drive operations whose answer arrives as several frames ending in
//! one marked `done`.
//!
//! ## Design Principles
//! 1. **One Machine Per Call Site**: Each builder owns its own `StreamCall`;
//!    two streams never share state.
//! 2. **Send Once**: Only the first call of a sequence writes the request;
//!    later calls only read.
//! 3. **Fail Back To Idle**: A `done` frame or any error returns the machine
//!    to `Idle`, so the next call starts a new request.
//!
//! ## State Machine
//!
//! ```text
//!            send + read                 read
//!   Idle ───────────────► InProgress ◄────────┐
//!    ▲                        │  └────────────┘
//!    └──── done / error ──────┘
//! ```

use pbkv_common::messages::{RpbIndexResp, RpbListKeysResp, RpbMapRedResp};
use pbkv_common::{Frame, OpCode, Response};

use crate::error::ClientResult;
use crate::session::{unexpected, Session};

/// Position in a streaming sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    InProgress,
}

/// A partial response of a streaming operation.
pub trait StreamFrame: Sized {
    /// Response code every frame of the stream carries.
    const OP: OpCode;

    /// Extracts the frame, handing back responses of another kind.
    fn from_response(response: Response) -> Result<Self, Response>;

    /// Whether this frame ends the stream.
    fn is_done(&self) -> bool;
}

impl StreamFrame for RpbListKeysResp {
    const OP: OpCode = OpCode::ListKeysResp;

    fn from_response(response: Response) -> Result<Self, Response> {
        match response {
            Response::ListKeys(resp) => Ok(resp),
            other => Err(other),
        }
    }

    fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }
}

impl StreamFrame for RpbMapRedResp {
    const OP: OpCode = OpCode::MapRedResp;

    fn from_response(response: Response) -> Result<Self, Response> {
        match response {
            Response::MapRed(resp) => Ok(resp),
            other => Err(other),
        }
    }

    fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }
}

impl StreamFrame for RpbIndexResp {
    const OP: OpCode = OpCode::IndexResp;

    fn from_response(response: Response) -> Result<Self, Response> {
        match response {
            Response::Index(resp) => Ok(resp),
            other => Err(other),
        }
    }

    fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }
}

/// State machine for one streaming call site.
#[derive(Debug, Default)]
pub struct StreamCall {
    state: StreamState,
}

impl StreamCall {
    pub fn new() -> Self {
        StreamCall::default()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Returns the next partial response.
    ///
    /// `request` is only built and sent when the machine is `Idle`.
    pub fn next<T: StreamFrame>(
        &mut self,
        session: &mut Session,
        request: impl FnOnce() -> Frame,
    ) -> ClientResult<T> {
        let result: ClientResult<T> = self.step(session, request);
        match &result {
            Ok(frame) if !frame.is_done() => {}
            _ => self.state = StreamState::Idle,
        }
        result
    }

    fn step<T: StreamFrame>(
        &mut self,
        session: &mut Session,
        request: impl FnOnce() -> Frame,
    ) -> ClientResult<T> {
        if self.state == StreamState::Idle {
            session.send(&request())?;
            self.state = StreamState::InProgress;
        }
        let response = session.execute_continuation()?;
        T::from_response(response).map_err(|other| unexpected(T::OP, &other))
    }
}
