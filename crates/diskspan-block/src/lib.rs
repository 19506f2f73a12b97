//! diskspan block layer
//!
//! Presents an array of fixed-size remote disks as one linear
//! byte-addressable volume. `VolumeDriver` owns the session (mount and
//! write-permission state), splits logical byte ranges into per-block
//! operations, and serves repeated reads out of `BlockCache`.
//!
//! ```text
//! ┌──────────────┐
//! │    Caller    │
//! └──────┬───────┘
//!        │ read/write(addr, buf)
//! ┌──────▼───────┐  hit?  ┌────────────┐
//! │ VolumeDriver ├───────►│ BlockCache │
//! └──────┬───────┘        └────────────┘
//!        │ miss: seek + read/write block
//! ┌──────▼───────┐
//! │  DiskClient  │  (one request/response per operation)
//! └──────────────┘
//! ```

pub mod addr;
pub mod cache;
pub mod error;
pub mod volume;

pub use addr::{BlockAddr, Segment, segments};
pub use cache::{BlockCache, CacheStats, EvictionPolicy, InsertOutcome};
pub use error::{CacheError, VolumeError, VolumeResult};
pub use volume::{SessionState, VolumeDriver};

/// Largest byte range one read or write call will serve
pub const MAX_IO_LEN: usize = 1024;
