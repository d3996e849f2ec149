//! Catalog Record definitions
//!
//! Defines the structure of individual catalog records and their framing.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZixError};
use crate::object::ObjectMeta;

/// Frame header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Where an object's bytes live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocation {
    /// Sequence of the lot holding the entry
    pub lot_sequence: u64,

    /// Entry name inside that lot's container
    pub entry_name: String,
}

/// A single record in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Object metadata captured at upload
    pub meta: ObjectMeta,

    /// Lot and entry holding the object
    pub location: ObjectLocation,
}

impl CatalogRecord {
    pub fn new(lsn: u64, meta: ObjectMeta, location: ObjectLocation) -> Self {
        Self {
            lsn,
            meta,
            location,
        }
    }

    /// Encode as a frame: `[LSN(8)][CRC(4)][Len(4)][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&(&self.meta, &self.location))?;
        if payload.len() > u32::MAX as usize {
            return Err(ZixError::Serialization(format!(
                "Catalog record too large: {} bytes",
                payload.len()
            )));
        }

        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode one complete frame, validating its CRC
    pub fn deserialize(frame: &[u8]) -> Result<Self> {
        let header = FrameHeader::parse(frame).ok_or_else(|| {
            ZixError::CatalogCorruption(format!("Frame too short: {} bytes", frame.len()))
        })?;

        let payload = &frame[HEADER_SIZE..];
        if payload.len() != header.len as usize {
            return Err(ZixError::CatalogCorruption(format!(
                "Frame length mismatch: header says {}, got {}",
                header.len,
                payload.len()
            )));
        }

        let actual_crc = crc32fast::hash(payload);
        if actual_crc != header.crc {
            return Err(ZixError::CatalogCorruption(format!(
                "CRC mismatch at LSN {}: expected {:08x}, got {:08x}",
                header.lsn, header.crc, actual_crc
            )));
        }

        let (meta, location): (ObjectMeta, ObjectLocation) = bincode::deserialize(payload)?;

        Ok(Self {
            lsn: header.lsn,
            meta,
            location,
        })
    }
}

/// Parsed fixed-size frame header
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    pub(crate) fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);

        Some(Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        })
    }
}
