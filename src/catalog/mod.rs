//! Catalog Module
//!
//! Durable object metadata and the name → location index.
//!
//! ## Responsibilities
//! - Append one record per uploaded object (metadata + lot location)
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Replay into an in-memory name index at startup
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! `Data` is bincode-encoded `(ObjectMeta, ObjectLocation)`.

mod record;
mod recovery;
mod writer;

pub use record::{CatalogRecord, ObjectLocation, HEADER_SIZE};
pub use recovery::{CatalogRecovery, RecoveryResult};
pub use writer::CatalogWriter;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::CatalogSyncStrategy;
use crate::error::Result;
use crate::object::ObjectMeta;

/// Extension of the catalog file (`<storage_name>.zi`)
pub const CATALOG_FILE_EXT: &str = "zi";

/// Indexed view of one catalog record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub lsn: u64,
    pub meta: ObjectMeta,
    pub location: ObjectLocation,
}

/// Persistent object catalog
///
/// ## Concurrency:
/// - `writer`: Mutex (appends are serialized)
/// - `index`: RwLock (many concurrent readers, exclusive writer)
pub struct Catalog {
    /// Catalog file path
    path: PathBuf,

    /// Appender for new records
    writer: Mutex<CatalogWriter>,

    /// Object name → indexed record (first record for a name wins)
    index: RwLock<HashMap<String, CatalogEntry>>,
}

impl Catalog {
    /// Open or create the catalog, replaying existing records
    pub fn open(path: &Path, sync_strategy: CatalogSyncStrategy) -> Result<(Self, RecoveryResult)> {
        let (records, result) = CatalogRecovery::recover(path)?;

        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            let name = record.meta.name.clone();
            if index.contains_key(&name) {
                warn!(object = %name, lsn = record.lsn, "ignoring duplicate catalog record");
                continue;
            }
            index.insert(
                name,
                CatalogEntry {
                    lsn: record.lsn,
                    meta: record.meta,
                    location: record.location,
                },
            );
        }

        if result.records_recovered > 0 || result.was_truncated {
            info!(
                path = %path.display(),
                recovered = result.records_recovered,
                corrupted = result.records_corrupted,
                last_lsn = result.last_lsn,
                "catalog replayed"
            );
        }

        let writer = CatalogWriter::open(path, sync_strategy, result.last_lsn + 1)?;

        Ok((
            Self {
                path: path.to_path_buf(),
                writer: Mutex::new(writer),
                index: RwLock::new(index),
            },
            result,
        ))
    }

    /// Record an object; it becomes visible in the index once durable
    pub fn insert(&self, meta: ObjectMeta, location: ObjectLocation) -> Result<u64> {
        let record = self.writer.lock().append(meta, location)?;
        let lsn = record.lsn;

        self.index.write().insert(
            record.meta.name.clone(),
            CatalogEntry {
                lsn,
                meta: record.meta,
                location: record.location,
            },
        );

        Ok(lsn)
    }

    /// Look up an object by name
    pub fn get(&self, name: &str) -> Option<CatalogEntry> {
        self.index.read().get(name).cloned()
    }

    /// Check whether an object name is indexed
    pub fn contains(&self, name: &str) -> bool {
        self.index.read().contains_key(name)
    }

    /// Metadata of every indexed object, ordered by LSN
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<CatalogEntry> = self.index.read().values().cloned().collect();
        entries.sort_by_key(|e| e.lsn);
        entries
    }

    /// Number of indexed objects
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// True when no objects are indexed
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Force pending records to disk
    pub fn sync(&self) -> Result<()> {
        self.writer.lock().sync()
    }

    /// Catalog file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
