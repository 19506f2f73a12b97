//! Packet framing
//!
//! One request/response exchange per operation. Both directions share the
//! same header shape: a 4-byte big-endian word followed by one status byte.
//! On a request the word is the encoded operation; on a response it is the
//! remote return code. Bit `0x02` of the status byte announces a trailing
//! block payload of exactly `BLOCK_SIZE` bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::BLOCK_SIZE;
use crate::error::{ProtoError, ProtoResult};
use crate::op::{Command, Operation};

/// Length of the fixed packet header
pub const HEADER_LEN: usize = 5;

/// Status-byte bit: a block payload follows the header
pub const FLAG_PAYLOAD: u8 = 0x02;

/// Encode one request packet.
///
/// A payload is attached only for `WriteBlock`; for any other command the
/// block argument is ignored and the payload bit stays clear.
pub fn encode_request(op: Operation, block: Option<&[u8]>) -> ProtoResult<Bytes> {
    let payload = match (op.command, block) {
        (Command::WriteBlock, Some(block)) => {
            if block.len() != BLOCK_SIZE {
                return Err(ProtoError::BadPayloadLength {
                    expected: BLOCK_SIZE,
                    actual: block.len(),
                });
            }
            Some(block)
        }
        _ => None,
    };

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.map_or(0, <[u8]>::len));
    buf.put_u32(op.encode());
    buf.put_u8(if payload.is_some() { FLAG_PAYLOAD } else { 0 });
    if let Some(payload) = payload {
        buf.put_slice(payload);
    }
    Ok(buf.freeze())
}

/// Decoded fixed header of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Remote return code; zero means success
    pub code: i32,
    /// Whether a block payload follows
    pub has_payload: bool,
}

impl ResponseHeader {
    /// Parse the fixed header; reading any announced payload is the
    /// caller's job.
    pub fn parse(raw: &[u8]) -> ProtoResult<Self> {
        if raw.len() < HEADER_LEN {
            return Err(ProtoError::TruncatedHeader(raw.len()));
        }
        let mut raw = raw;
        let code = raw.get_i32();
        let status = raw.get_u8();
        Ok(Self {
            code,
            has_payload: status & FLAG_PAYLOAD != 0,
        })
    }
}
