//! # Wire Errors
//!
//! Purpose: Name every way a frame can fail to become a typed message, and
//! carry server-side error replies as structured values.
//!
//! ## Design Principles
//! 1. **Closed Set**: Every decode failure maps onto one `WireError` variant.
//! 2. **No Silent Drops**: Unknown op codes are reported with their value.
//! 3. **Remote Is Data**: A server error reply is a successful decode that
//!    yields a `RemoteError`, not a codec failure.

use std::fmt;

use thiserror::Error;

use crate::opcode::OpCode;

/// Result type for frame and message decoding.
pub type WireResult<T> = Result<T, WireError>;

/// Malformed or unrecognized frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The envelope declared a zero length, so there is no op code.
    #[error("frame was 0 bytes long")]
    ZeroLength,

    /// The declared length exceeds what the codec accepts.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: u32, max: u32 },

    /// The op code is not in the protocol table.
    #[error("unknown op code {0}")]
    UnknownOpCode(u8),

    /// The op code is known but not valid in this direction.
    #[error("op code {} ({}) is not valid here", .0.as_u8(), .0.name())]
    UnexpectedOpCode(OpCode),

    /// An enum field carried a value outside its declared range.
    #[error("{field} has no variant {value}")]
    InvalidEnum { field: &'static str, value: i32 },

    /// The protobuf payload could not be decoded.
    #[error("invalid {message} payload: {source}")]
    Payload {
        message: &'static str,
        #[source]
        source: prost::DecodeError,
    },
}

impl WireError {
    pub(crate) fn payload(message: &'static str, source: prost::DecodeError) -> Self {
        WireError::Payload { message, source }
    }
}

/// Error reply sent by the server (op code 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Numeric error code chosen by the server.
    pub code: u32,
    /// Human-readable message, lossily converted from wire bytes.
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error [{}]: {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}
