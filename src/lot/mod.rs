//! Lot Module
//!
//! A lot is one size-bounded container file inside the zone.
//!
//! ## Naming
//! ```text
//! <storage_name>.zl.<sequence>      e.g. "store.zl.1", "store.zl.2"
//! ```
//! A lot file name has exactly three dot-delimited parts. Sequences start at
//! 1 and are gapless.

mod registry;

pub use registry::LotRegistry;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZixError};

/// Extension component that marks a lot file
pub const LOT_FILE_EXT: &str = "zl";

/// Handle describing one lot file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// File name (`<storage_name>.zl.<sequence>`)
    pub file_name: String,
    /// Full path of the lot file
    pub file_path: PathBuf,
    /// Last measured size in bytes
    pub size_bytes: u64,
    /// 1-based sequence number
    pub sequence: u64,
}

impl Lot {
    /// Describe a lot that has not been created on disk yet
    pub fn new(zone_dir: &Path, storage_name: &str, sequence: u64) -> Self {
        let file_name = lot_file_name(storage_name, sequence);
        Self {
            file_path: zone_dir.join(&file_name),
            file_name,
            size_bytes: 0,
            sequence,
        }
    }

    /// Build a lot from an existing file, reading its size from the filesystem
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ZixError::Registry(format!("{} has no file name", path.display())))?;
        let sequence = parse_lot_sequence(&file_name)?.ok_or_else(|| {
            ZixError::Registry(format!("{} is not a lot file", file_name))
        })?;
        let size_bytes = fs::metadata(path)?.len();

        Ok(Self {
            file_name,
            file_path: path.to_path_buf(),
            size_bytes,
            sequence,
        })
    }

    /// Re-measure the on-disk size
    pub fn refresh_size(&mut self) -> Result<u64> {
        self.size_bytes = fs::metadata(&self.file_path)?.len();
        Ok(self.size_bytes)
    }
}

/// File name of the lot with the given sequence
pub fn lot_file_name(storage_name: &str, sequence: u64) -> String {
    format!("{}.{}.{}", storage_name, LOT_FILE_EXT, sequence)
}

/// Parse a lot sequence from a file name
///
/// - `Ok(Some(seq))` for `<name>.zl.<seq>`
/// - `Ok(None)` when the name is not shaped like a lot file
/// - `Err(MalformedLotFilename)` when it is, but the sequence does not parse
pub fn parse_lot_sequence(file_name: &str) -> Result<Option<u64>> {
    let parts: Vec<&str> = file_name.split('.').collect();
    if parts.len() != 3 || parts[1] != LOT_FILE_EXT {
        return Ok(None);
    }
    if parts[0].is_empty() {
        return Err(ZixError::MalformedLotFilename {
            file_name: file_name.to_string(),
        });
    }

    match parts[2].parse::<u64>() {
        Ok(seq) if seq > 0 => Ok(Some(seq)),
        _ => Err(ZixError::MalformedLotFilename {
            file_name: file_name.to_string(),
        }),
    }
}
