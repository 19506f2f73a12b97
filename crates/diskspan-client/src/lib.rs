//! diskspan network client
//!
//! Blocking client for the remote disk service: a small transport
//! abstraction plus the request/response framing on top of it. Policy —
//! mount state, caching, address translation — lives a layer up in
//! `diskspan-block`.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{DiskClient, Response};
pub use error::{ClientError, ClientResult};
pub use transport::{TcpTransport, Transport};
