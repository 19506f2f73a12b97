//! Operation word encoding
//!
//! Every request names one operation, packed into a 32-bit word on the wire:
//!
//! ```text
//! bits  0..4   disk id
//! bits  4..12  block id
//! bits 12..20  command
//! bits 20..32  reserved (zero on encode, ignored on decode)
//! ```

use crate::NUM_DISKS;
use crate::error::{ProtoError, ProtoResult};

const BLOCK_SHIFT: u32 = 4;
const COMMAND_SHIFT: u32 = 12;
const DISK_MASK: u32 = 0x0f;
const BLOCK_MASK: u32 = 0xff;
const COMMAND_MASK: u32 = 0xff;

/// Action requested by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Open the session
    Mount = 0,
    /// Close the session
    Unmount = 1,
    /// Allow subsequent block writes
    GrantWrite = 2,
    /// Disallow block writes again
    RevokeWrite = 3,
    /// Position the server-side cursor on a disk
    SeekDisk = 4,
    /// Position the server-side cursor on a block
    SeekBlock = 5,
    /// Read the block under the cursor
    ReadBlock = 6,
    /// Overwrite the block under the cursor
    WriteBlock = 7,
}

impl Command {
    /// Decode a command byte
    pub fn from_u8(value: u8) -> ProtoResult<Self> {
        match value {
            0 => Ok(Self::Mount),
            1 => Ok(Self::Unmount),
            2 => Ok(Self::GrantWrite),
            3 => Ok(Self::RevokeWrite),
            4 => Ok(Self::SeekDisk),
            5 => Ok(Self::SeekBlock),
            6 => Ok(Self::ReadBlock),
            7 => Ok(Self::WriteBlock),
            other => Err(ProtoError::UnknownCommand(other)),
        }
    }
}

/// One decoded operation word
///
/// Replaces raw bit arithmetic at call sites with a tagged structure; the
/// constructors enforce the field widths so every `Operation` in existence
/// encodes cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Requested action
    pub command: Command,
    /// Disk addressed by seek operations
    pub disk_id: u8,
    /// Block addressed by seek operations
    pub block_id: u8,
}

impl Operation {
    /// Build an operation, checking the disk field against its 4-bit width
    pub fn new(command: Command, disk_id: u8, block_id: u8) -> ProtoResult<Self> {
        if disk_id >= NUM_DISKS {
            return Err(ProtoError::FieldRange {
                field: "disk_id",
                value: u32::from(disk_id),
                max: u32::from(NUM_DISKS - 1),
            });
        }
        Ok(Self {
            command,
            disk_id,
            block_id,
        })
    }

    /// An operation that carries no addressing (mount, permission, I/O)
    pub fn control(command: Command) -> Self {
        Self {
            command,
            disk_id: 0,
            block_id: 0,
        }
    }

    /// Seek the remote cursor to a disk
    pub fn seek_disk(disk_id: u8) -> ProtoResult<Self> {
        Self::new(Command::SeekDisk, disk_id, 0)
    }

    /// Seek the remote cursor to a block on the current disk
    pub fn seek_block(block_id: u8) -> Self {
        Self {
            command: Command::SeekBlock,
            disk_id: 0,
            block_id,
        }
    }

    /// Pack into the 32-bit wire word
    pub fn encode(self) -> u32 {
        u32::from(self.disk_id)
            | u32::from(self.block_id) << BLOCK_SHIFT
            | (self.command as u32) << COMMAND_SHIFT
    }

    /// Unpack a wire word, ignoring the reserved bits
    pub fn decode(word: u32) -> ProtoResult<Self> {
        let command = Command::from_u8(((word >> COMMAND_SHIFT) & COMMAND_MASK) as u8)?;
        Ok(Self {
            command,
            disk_id: (word & DISK_MASK) as u8,
            block_id: ((word >> BLOCK_SHIFT) & BLOCK_MASK) as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_COMMANDS: [Command; 8] = [
        Command::Mount,
        Command::Unmount,
        Command::GrantWrite,
        Command::RevokeWrite,
        Command::SeekDisk,
        Command::SeekBlock,
        Command::ReadBlock,
        Command::WriteBlock,
    ];

    #[test]
    fn test_encode_decode_identity() {
        for command in ALL_COMMANDS {
            for disk_id in 0..NUM_DISKS {
                for block_id in (0..=u8::MAX).step_by(17) {
                    let op = Operation::new(command, disk_id, block_id).unwrap();
                    let decoded = Operation::decode(op.encode()).unwrap();
                    assert_eq!(decoded, op);
                }
            }
        }
    }

    #[test]
    fn test_field_layout() {
        let op = Operation::new(Command::SeekBlock, 0x3, 0xab).unwrap();
        assert_eq!(op.encode(), 0x3 | 0xab << 4 | 5 << 12);
    }

    #[test]
    fn test_reserved_bits_ignored() {
        let word = Operation::control(Command::ReadBlock).encode() | 0xfff << 20;
        let decoded = Operation::decode(word).unwrap();
        assert_eq!(decoded.command, Command::ReadBlock);
        assert_eq!(decoded.disk_id, 0);
        assert_eq!(decoded.block_id, 0);
    }

    #[test]
    fn test_disk_field_width_enforced() {
        let result = Operation::seek_disk(NUM_DISKS);
        assert!(matches!(result, Err(ProtoError::FieldRange { .. })));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let word = 9u32 << 12;
        assert!(matches!(
            Operation::decode(word),
            Err(ProtoError::UnknownCommand(9))
        ));
    }
}
