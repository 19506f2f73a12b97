//! Client error types

use diskspan_proto::ProtoError;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Protocol client error
#[derive(Error, Debug)]
pub enum ClientError {
    /// No connection is active
    #[error("not connected to a disk service")]
    Disconnected,

    /// Peer closed the stream mid-frame
    #[error("stream closed mid-frame: wanted {wanted} bytes, got {got}")]
    ShortIo { wanted: usize, got: usize },

    /// Connection establishment failed
    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),

    /// Transport-level I/O failure
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame
    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),
}
