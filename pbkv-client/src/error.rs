//! # Client Errors
//!
//! Purpose: One error type for everything a caller of the client can observe.
//!
//! ## Design Principles
//! 1. **Layered Causes**: Socket failures, malformed frames and server replies
//!    stay distinct so callers can decide what to retry.
//! 2. **Lifecycle Is Typed**: Misuse of the client (before dial, after close)
//!    is its own variant rather than a string.

use std::io;

use pbkv_common::{RemoteError, WireError};
use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Dial or socket I/O failure, including short writes and truncated reads.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// Malformed or unrecognized frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    /// The server answered with an error reply.
    #[error("remote error [{code}]: {message}")]
    Remote { code: u32, message: String },

    /// Every configured node was unreachable at dial time.
    #[error("all nodes appear to be down")]
    AllNodesDown,

    /// Every pooled node was down during one full acquisition pass.
    #[error("no active node available")]
    Unavailable,

    /// The caller supplied a request that does not fit the operation.
    #[error("usage error: {0}")]
    Usage(String),

    /// A session was requested before a successful dial.
    #[error("client is not connected")]
    NotConnected,

    /// The client has been closed.
    #[error("client is closed")]
    Closed,

    /// The server answered with a response of the wrong kind.
    #[error("expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<RemoteError> for ClientError {
    fn from(err: RemoteError) -> Self {
        ClientError::Remote {
            code: err.code,
            message: err.message,
        }
    }
}

impl ClientError {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        ClientError::Usage(message.into())
    }

    /// Whether the error came from the socket, which marks the node down.
    pub fn is_connection(&self) -> bool {
        matches!(self, ClientError::Connection(_))
    }
}
