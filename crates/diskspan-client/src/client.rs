//! Remote disk service client
//!
//! Frames operations over a transport: encode a request, push it out
//! through the partial-write loop, then pull back the fixed response header
//! and an optional block payload. The client does not interpret return
//! codes, mount state, or cache contents — it only frames and deframes
//! bytes.

use diskspan_proto::{BLOCK_SIZE, Block, HEADER_LEN, Operation, ResponseHeader, encode_request};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::transport::{TcpTransport, Transport};

/// One response from the remote service
#[derive(Debug, Clone)]
pub struct Response {
    /// Remote return code; zero means the operation was accepted
    pub code: i32,
    /// Block payload, when the response announced one
    pub block: Option<Block>,
}

/// Client for the remote disk service
///
/// Exactly one request is in flight at a time; the protocol has no
/// multiplexing or pipelining.
pub struct DiskClient<T: Transport> {
    transport: Option<T>,
}

impl DiskClient<TcpTransport> {
    /// Connect to the remote service over TCP
    pub fn connect(host: &str, port: u16) -> ClientResult<Self> {
        let transport = TcpTransport::connect(host, port).map_err(ClientError::Connect)?;
        debug!(host, port, "connected to disk service");
        Ok(Self::new(transport))
    }
}

impl<T: Transport> DiskClient<T> {
    /// Wrap an already-connected transport
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// Whether the client currently holds a connection
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Drop the connection; harmless when already disconnected
    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            debug!("disconnected from disk service");
        }
    }

    /// Send one operation and wait for its response.
    ///
    /// A block is attached to the request only for `WriteBlock`; the
    /// response carries a block only when the peer set the payload bit.
    pub fn send_operation(&mut self, op: Operation, block: Option<&[u8]>) -> ClientResult<Response> {
        let frame = encode_request(op, block)?;
        let transport = self.transport.as_mut().ok_or(ClientError::Disconnected)?;

        send_all(transport, &frame)?;
        debug!(command = ?op.command, len = frame.len(), "request sent");

        let mut header = [0u8; HEADER_LEN];
        recv_exact(transport, &mut header)?;
        let header = ResponseHeader::parse(&header)?;

        let payload = if header.has_payload {
            let mut block: Block = [0; BLOCK_SIZE];
            recv_exact(transport, &mut block)?;
            Some(block)
        } else {
            None
        };
        debug!(
            command = ?op.command,
            code = header.code,
            payload = payload.is_some(),
            "response received"
        );

        Ok(Response {
            code: header.code,
            block: payload,
        })
    }
}

/// Push the whole buffer out, absorbing partial writes
fn send_all<T: Transport>(transport: &mut T, mut buf: &[u8]) -> ClientResult<()> {
    let total = buf.len();
    while !buf.is_empty() {
        match transport.send(buf) {
            Ok(0) => {
                return Err(ClientError::ShortIo {
                    wanted: total,
                    got: total - buf.len(),
                });
            }
            Ok(sent) => buf = &buf[sent..],
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Fill the whole buffer, absorbing partial reads
fn recv_exact<T: Transport>(transport: &mut T, buf: &mut [u8]) -> ClientResult<()> {
    let total = buf.len();
    let mut filled = 0;
    while filled < total {
        match transport.recv(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ClientError::ShortIo {
                    wanted: total,
                    got: filled,
                });
            }
            Ok(got) => filled += got,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
