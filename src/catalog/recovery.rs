//! Catalog Recovery
//!
//! Replays the catalog file at startup and cuts off a torn tail.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::warn;

use crate::error::Result;

use super::record::FrameHeader;
use super::{CatalogRecord, HEADER_SIZE};

/// Handles catalog replay after restart or crash
pub struct CatalogRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records successfully recovered
    pub records_recovered: u64,

    /// Number of corrupted records found (recovery stops at the first)
    pub records_corrupted: u64,

    /// Last valid LSN (0 when none)
    pub last_lsn: u64,

    /// Whether the file was (or would be) truncated to the last good record
    pub was_truncated: bool,

    /// Byte length of the valid prefix
    pub valid_len: u64,
}

impl CatalogRecovery {
    /// Recover records from a catalog file
    ///
    /// This will:
    /// 1. Read every well-formed record in order
    /// 2. Stop at the first partial, corrupted or out-of-order record
    /// 3. Truncate the file to the end of the last good record
    /// 4. Return the good records in order
    ///
    /// A missing file recovers as empty.
    pub fn recover(path: &Path) -> Result<(Vec<CatalogRecord>, RecoveryResult)> {
        let (records, result) = Self::scan(path)?;

        if result.was_truncated {
            warn!(
                path = %path.display(),
                valid_len = result.valid_len,
                corrupted = result.records_corrupted,
                "truncating catalog tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
        }

        Ok((records, result))
    }

    /// Verify integrity of a catalog file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path).map(|(_, result)| result)
    }

    fn scan(path: &Path) -> Result<(Vec<CatalogRecord>, RecoveryResult)> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Vec::new(), RecoveryResult::default()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut result = RecoveryResult::default();
        let mut pos = 0usize;

        while pos < data.len() {
            // Partial header at the tail
            let header = match FrameHeader::parse(&data[pos..]) {
                Some(h) => h,
                None => break,
            };

            // Partial payload at the tail
            let end = pos + HEADER_SIZE + header.len as usize;
            if end > data.len() {
                break;
            }

            match CatalogRecord::deserialize(&data[pos..end]) {
                Ok(record) if record.lsn > result.last_lsn => {
                    result.last_lsn = record.lsn;
                    result.records_recovered += 1;
                    records.push(record);
                    pos = end;
                }
                Ok(record) => {
                    warn!(
                        path = %path.display(),
                        lsn = record.lsn,
                        last_lsn = result.last_lsn,
                        "out-of-order catalog record"
                    );
                    result.records_corrupted += 1;
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupted catalog record");
                    result.records_corrupted += 1;
                    break;
                }
            }
        }

        result.valid_len = pos as u64;
        result.was_truncated = pos < data.len();

        Ok((records, result))
    }
}
