//! Wire protocol error types

use thiserror::Error;

/// Result type for protocol encoding and decoding
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Wire protocol error
#[derive(Error, Debug)]
pub enum ProtoError {
    /// Command byte not in the opcode table
    #[error("unknown command byte: {0:#04x}")]
    UnknownCommand(u8),

    /// Operation field outside its encoded width
    #[error("{field} value {value} exceeds maximum {max}")]
    FieldRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// Block payload with the wrong length
    #[error("payload must be exactly {expected} bytes, got {actual}")]
    BadPayloadLength { expected: usize, actual: usize },

    /// Header shorter than the fixed header length
    #[error("header truncated at {0} bytes")]
    TruncatedHeader(usize),
}
