//! # Envelope Framing
//!
//! Purpose: Convert between raw bytes and `(op code, payload)` envelopes.
//!
//! ## Design Principles
//! 1. **Length Counts The Code**: `length = 1 + len(payload)`, always.
//! 2. **Code Travels With Payload**: A frame body is never split; the first
//!    byte is the op code and the remainder is the protobuf payload.
//! 3. **Incremental Decode**: Partial input yields `Ok(None)` so async readers
//!    can keep buffering.
//! 4. **Bounded Allocation**: Oversized lengths are rejected up front.
//!
//! ## Layout
//!
//! ```text
//! +-----------------+----------+----------------------+
//! | length: u32 BE  | code: u8 | payload: length - 1  |
//! +-----------------+----------+----------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};
use crate::opcode::OpCode;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest accepted frame body (code + payload), 64 MiB.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// One decoded envelope.
///
/// The code is kept as a raw byte so that frames with codes outside the table
/// still round-trip; typed dispatch happens in `Response`/`Request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Op code byte.
    pub code: u8,
    /// Protobuf payload, possibly empty.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a frame for a known op code.
    pub fn new(code: OpCode, payload: impl Into<Bytes>) -> Self {
        Frame {
            code: code.as_u8(),
            payload: payload.into(),
        }
    }

    /// Creates a frame with no payload.
    pub fn empty(code: OpCode) -> Self {
        Frame::new(code, Bytes::new())
    }

    /// Creates a frame carrying an encoded protobuf message.
    pub fn message<M: prost::Message>(code: OpCode, message: &M) -> Self {
        Frame::new(code, message.encode_to_vec())
    }

    /// Decodes the payload as `M`, naming the message on failure.
    pub fn parse<M: prost::Message + Default>(&self, name: &'static str) -> WireResult<M> {
        M::decode(&self.payload[..]).map_err(|err| WireError::payload(name, err))
    }

    /// Resolves the op code against the protocol table.
    pub fn op(&self) -> WireResult<OpCode> {
        OpCode::from_u8(self.code).ok_or(WireError::UnknownOpCode(self.code))
    }

    /// Value of the envelope length field, saturating at `u32::MAX`.
    pub fn wire_len(&self) -> u32 {
        u32::try_from(self.payload.len() + 1).unwrap_or(u32::MAX)
    }

    /// Rejects a frame the peer would refuse, before any byte is sent.
    pub fn check_size(&self) -> WireResult<()> {
        check_len(self.wire_len())
    }

    /// Appends the envelope to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(LENGTH_PREFIX_SIZE + 1 + self.payload.len());
        buf.put_u32(self.wire_len());
        buf.put_u8(self.code);
        buf.put_slice(&self.payload);
    }

    /// Encodes the envelope into a fresh buffer.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + 1 + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Builds a frame from a body already stripped of its length prefix.
    pub fn from_body(mut body: Bytes) -> WireResult<Self> {
        if body.is_empty() {
            return Err(WireError::ZeroLength);
        }
        let code = body.get_u8();
        Ok(Frame {
            code,
            payload: body,
        })
    }

    /// Attempts to decode one envelope from the front of `buf`.
    ///
    /// Returns `Ok(None)` until a complete envelope is buffered. On success the
    /// consumed bytes are removed from `buf`.
    pub fn decode(buf: &mut BytesMut) -> WireResult<Option<Self>> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        check_len(len)?;

        let total = LENGTH_PREFIX_SIZE + len as usize;
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let body = buf.split_to(len as usize).freeze();
        Frame::from_body(body).map(Some)
    }
}

/// Validates a declared envelope length before anything is allocated for it.
pub fn check_len(len: u32) -> WireResult<()> {
    if len == 0 {
        return Err(WireError::ZeroLength);
    }
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(())
}

/// Encodes `(code, payload)` into a complete envelope.
pub fn encode(code: OpCode, payload: &[u8]) -> Bytes {
    Frame::new(code, Bytes::copy_from_slice(payload)).encode_to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_length_including_code() {
        let bytes = encode(OpCode::GetReq, b"abc");
        assert_eq!(&bytes[..], &[0, 0, 0, 4, 9, b'a', b'b', b'c']);
    }

    #[test]
    fn ack_frames_have_no_payload() {
        let bytes = Frame::empty(OpCode::PingReq).encode_to_bytes();
        assert_eq!(&bytes[..], &[0, 0, 0, 1, 1]);
    }

    #[test]
    fn decode_recovers_code_and_payload() {
        let cases: [(OpCode, &[u8]); 4] = [
            (OpCode::PingResp, b""),
            (OpCode::PutReq, b"payload"),
            (OpCode::ErrorResp, &[0, 1, 2, 255]),
            (OpCode::DtUpdateResp, &[7; 300]),
        ];
        for (code, payload) in cases {
            let mut buf = BytesMut::from(&encode(code, payload)[..]);
            let frame = Frame::decode(&mut buf).unwrap().unwrap();
            assert_eq!(frame.op().unwrap(), code);
            assert_eq!(&frame.payload[..], payload);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn partial_input_waits_for_more() {
        let full = encode(OpCode::GetResp, b"hello");
        let mut buf = BytesMut::new();
        for (idx, byte) in full.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = Frame::decode(&mut buf).unwrap();
            if idx + 1 < full.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(&decoded.unwrap().payload[..], b"hello");
            }
        }
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut buf = BytesMut::new();
        Frame::new(OpCode::ListKeysResp, &b"one"[..]).encode(&mut buf);
        Frame::new(OpCode::ListKeysResp, &b"two"[..]).encode(&mut buf);
        let first = Frame::decode(&mut buf).unwrap().unwrap();
        let second = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first.payload[..], b"one");
        assert_eq!(&second.payload[..], b"two");
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn zero_length_is_rejected() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        assert!(matches!(Frame::decode(&mut buf), Err(WireError::ZeroLength)));
        assert!(matches!(Frame::from_body(Bytes::new()), Err(WireError::ZeroLength)));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_LEN + 1);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn outgoing_size_is_checked() {
        let at_limit = Frame::new(OpCode::PutReq, vec![0u8; MAX_FRAME_LEN as usize - 1]);
        assert_eq!(at_limit.wire_len(), MAX_FRAME_LEN);
        assert!(at_limit.check_size().is_ok());

        let over = Frame::new(OpCode::PutReq, vec![0u8; MAX_FRAME_LEN as usize]);
        assert!(matches!(
            over.check_size(),
            Err(WireError::FrameTooLarge { size, .. }) if size == MAX_FRAME_LEN + 1
        ));
    }

    #[test]
    fn unknown_code_still_frames() {
        let frame = Frame::from_body(Bytes::from_static(&[99, 1, 2])).unwrap();
        assert_eq!(frame.code, 99);
        assert!(matches!(frame.op(), Err(WireError::UnknownOpCode(99))));
    }
}
