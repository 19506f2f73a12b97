//! diskspan wire protocol
//!
//! Vocabulary shared by every diskspan component: the fixed array geometry,
//! the 32-bit operation word, and the packet framing spoken between a client
//! and the remote disk service. Pure data — no I/O lives here.

pub mod error;
pub mod op;
pub mod packet;

pub use error::{ProtoError, ProtoResult};
pub use op::{Command, Operation};
pub use packet::{FLAG_PAYLOAD, HEADER_LEN, ResponseHeader, encode_request};

/// Size of one storage block in bytes
pub const BLOCK_SIZE: usize = 256;

/// Number of disks in the array (bounded by the 4-bit disk field)
pub const NUM_DISKS: u8 = 16;

/// Number of blocks on each disk (bounded by the 8-bit block field)
pub const BLOCKS_PER_DISK: u16 = 256;

/// Capacity of one disk in bytes
pub const DISK_SIZE: u64 = BLOCKS_PER_DISK as u64 * BLOCK_SIZE as u64;

/// Total logical address space in bytes
pub const TOTAL_SIZE: u64 = NUM_DISKS as u64 * DISK_SIZE;

/// One fixed-size block of storage
pub type Block = [u8; BLOCK_SIZE];
