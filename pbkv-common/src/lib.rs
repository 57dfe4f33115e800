// pbkv-common - Shared wire protocol for pbkv
//
// This crate defines the op-code table, envelope framing, the protobuf
// messages and typed request/response dispatch used by client and server.

pub mod error;
pub mod frame;
pub mod messages;
pub mod opcode;
pub mod request;
pub mod response;

// Re-export for convenience
pub use error::{RemoteError, WireError, WireResult};
pub use frame::{Frame, LENGTH_PREFIX_SIZE, MAX_FRAME_LEN};
pub use opcode::OpCode;
pub use request::Request;
pub use response::Response;
