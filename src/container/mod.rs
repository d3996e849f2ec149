//! Container Module
//!
//! The on-disk codec for a single lot file: a flat archive of named entries
//! followed by a central directory.
//!
//! ## Responsibilities
//! - Create and open container files
//! - Append a named entry (store mode, no compression)
//! - Enumerate entries through the central directory
//! - Extract an entry's bytes into a sink, verifying its CRC
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Header (8 + comment)                                             │
//! │   Magic: "ZXLT" (4) | Version: u16 (2) | CommentLen: u16 (2)     │
//! │   Comment bytes                                                  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Entries (variable)                                               │
//! │   [Mode: u8][NameLen: u16][CommentLen: u16][DataLen: u64]        │
//! │   [CRC: u32][Name][Comment][Data]                                │
//! │   ... repeated for each entry ...                                │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Central Directory (variable)                                     │
//! │   [Offset: u64][DataLen: u64][CRC: u32][Mode: u8][NameLen: u16]  │
//! │   [Name]                                                         │
//! │   ... repeated for each entry ...                                │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Footer (24 bytes)                                                │
//! │   DirOffset: u64 | EntryCount: u32 | DirCRC: u32 |               │
//! │   Magic: "ZXND" (4) | Padding (4)                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Appending overwrites the old directory with the new entry and then
//! rewrites the directory and footer after it.

mod archive;
mod directory;

pub use archive::Container;

use crate::error::{Result, ZixError};

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes at the start of a container file
pub(crate) const MAGIC: &[u8; 4] = b"ZXLT";

/// Magic bytes inside the footer
pub(crate) const END_MAGIC: &[u8; 4] = b"ZXND";

/// Current container format version
pub(crate) const VERSION: u16 = 1;

/// Fixed part of the header: Magic (4) + Version (2) + CommentLen (2)
pub(crate) const HEADER_SIZE: u64 = 8;

/// Fixed part of an entry: Mode (1) + NameLen (2) + CommentLen (2) + DataLen (8) + CRC (4)
pub(crate) const LOCAL_HEADER_SIZE: u64 = 17;

/// Fixed part of a directory record: Offset (8) + DataLen (8) + CRC (4) + Mode (1) + NameLen (2)
pub(crate) const DIR_RECORD_SIZE: usize = 23;

/// Footer: DirOffset (8) + EntryCount (4) + DirCRC (4) + Magic (4) + Padding (4)
pub(crate) const FOOTER_SIZE: u64 = 24;

/// Comment written into every lot created by the engine
pub const LOT_COMMENT: &str = "engine:db:zix";

// =============================================================================
// Entries
// =============================================================================

/// How an entry's bytes are encoded inside the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionMode {
    /// Bytes stored as-is
    Store = 0,
}

impl TryFrom<u8> for CompressionMode {
    type Error = ZixError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionMode::Store),
            other => Err(ZixError::Container(format!(
                "Unsupported compression mode: {}",
                other
            ))),
        }
    }
}

/// One record of the central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    /// Entry name (the object key)
    pub name: String,
    /// File offset of the entry's local header
    pub offset: u64,
    /// Length of the stored bytes
    pub data_len: u64,
    /// CRC32 of the stored bytes
    pub crc: u32,
    /// Encoding of the stored bytes
    pub mode: CompressionMode,
}

pub(crate) fn le_u16(b: &[u8]) -> u16 {
    let mut a = [0u8; 2];
    a.copy_from_slice(&b[..2]);
    u16::from_le_bytes(a)
}

pub(crate) fn le_u32(b: &[u8]) -> u32 {
    let mut a = [0u8; 4];
    a.copy_from_slice(&b[..4]);
    u32::from_le_bytes(a)
}

pub(crate) fn le_u64(b: &[u8]) -> u64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(&b[..8]);
    u64::from_le_bytes(a)
}
