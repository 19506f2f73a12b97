//! Stream transport abstraction
//!
//! The framing layer speaks through this trait so it can be exercised
//! against in-memory fakes. A transfer may move fewer bytes than asked;
//! completing frames is the caller's job.

use std::io::{self, Read, Write};
use std::net::TcpStream;

/// A connected, reliable byte stream
pub trait Transport {
    /// Send at most `buf.len()` bytes, returning how many were accepted
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Receive at most `buf.len()` bytes, returning how many arrived; zero
    /// means the peer closed the stream
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Blocking TCP transport
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to `host:port`.
    ///
    /// Nagle buffering is switched off; the protocol is strict
    /// request-then-response.
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}
