//! Block layer error types

use diskspan_client::ClientError;
use diskspan_proto::{Command, ProtoError};
use thiserror::Error;

/// Result type for volume operations
pub type VolumeResult<T> = Result<T, VolumeError>;

/// Block cache error
///
/// Misses and duplicate inserts are expected control-flow signals the
/// volume driver consumes internally; they never reach its callers.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Capacity outside the supported range, or the cache already exists
    #[error("invalid cache capacity: {0}")]
    InvalidCapacity(usize),

    /// Operation against a cache that was never created
    #[error("cache is not initialized")]
    NotInitialized,

    /// Key outside the array geometry
    #[error("coordinates out of range: disk {disk}, block {block}")]
    InvalidArgument { disk: u8, block: u8 },

    /// Key already cached
    #[error("block already cached: disk {disk}, block {block}")]
    AlreadyPresent { disk: u8, block: u8 },

    /// Key not cached
    #[error("block not cached: disk {disk}, block {block}")]
    CacheMiss { disk: u8, block: u8 },
}

/// Volume driver error
#[derive(Error, Debug)]
pub enum VolumeError {
    /// Session is not mounted
    #[error("volume is not mounted")]
    NotMounted,

    /// Session is already mounted
    #[error("volume is already mounted")]
    AlreadyMounted,

    /// Write attempted without write permission
    #[error("write permission not granted")]
    PermissionDenied,

    /// Request outside the volume bounds or over the per-call cap
    #[error("invalid request: {len} bytes at address {addr}")]
    InvalidRequest { addr: u64, len: usize },

    /// Remote service refused the operation
    #[error("remote rejected {op:?} with code {code}")]
    RemoteRejected { op: Command, code: i32 },

    /// Response did not carry the block it must
    #[error("{op:?} response carried no block payload")]
    MissingPayload { op: Command },

    /// Transport or framing failure
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Operation could not be encoded
    #[error(transparent)]
    Proto(#[from] ProtoError),
}
