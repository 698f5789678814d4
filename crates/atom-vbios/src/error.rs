//! Error types for VBIOS parsing

use thiserror::Error;

/// Result type alias for VBIOS operations
pub type Result<T> = std::result::Result<T, VbiosError>;

/// Errors that can occur while reading a VBIOS image
#[derive(Debug, Error)]
pub enum VbiosError {
    /// A read would run past the end of the image
    #[error("VBIOS read out of range: {offset:#06x}+{len} exceeds image size {size:#06x}")]
    OutOfRange {
        /// Start offset of the attempted read
        offset: u32,
        /// Length of the attempted read in bytes
        len: u32,
        /// Total image size in bytes
        size: usize,
    },

    /// The image does not start with the 0xAA55 ROM signature
    #[error("invalid VBIOS signature {signature:#06x} (expected 0xaa55)")]
    InvalidSignature {
        /// Signature actually found at offset 0
        signature: u16,
    },

    /// The ROM header's pointer to the ROM table is zero
    #[error("cannot locate VBIOS ROM table header")]
    MissingRomTable,

    /// The ROM table magic is neither "ATOM" nor "MOTA"
    #[error("invalid VBIOS ROM table magic {magic:02x?}")]
    InvalidRomTableMagic {
        /// The four magic bytes actually found
        magic: [u8; 4],
    },

    /// The command table has no entry for the requested command
    #[error("command {index:#04x} is not supported by this VBIOS")]
    UnsupportedCommand {
        /// Command index that was looked up
        index: u8,
    },

    /// A data-table lookup went past the table
    #[error("data table index {index} out of range")]
    InvalidDataTable {
        /// Data table index that was looked up
        index: u16,
    },

    /// Firmware info is present but not in the one revision we speak
    #[error("unsupported firmware info revision {format}.{content} (expected 2.2)")]
    UnsupportedFirmwareRevision {
        /// Format revision found in the table header
        format: u8,
        /// Content revision found in the table header
        content: u8,
    },

    /// The indirect-I/O program region contains a byte that is not an opcode
    #[error("malformed indirect IO table: byte {opcode:#04x} at {offset:#06x} is not an opcode")]
    MalformedIioTable {
        /// The offending byte
        opcode: u8,
        /// Image offset of the offending byte
        offset: u32,
    },
}
