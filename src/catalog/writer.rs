//! Catalog Writer
//!
//! Handles appending records to the catalog file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::CatalogSyncStrategy;
use crate::error::{Result, ZixError};
use crate::object::ObjectMeta;

use super::{CatalogRecord, ObjectLocation};

/// Appends records to the catalog file
///
/// A failed write or sync truncates the file back to its length before the
/// append. If that truncation fails too the writer is poisoned and refuses
/// further appends, since anything written after a torn frame would be lost
/// on recovery.
pub struct CatalogWriter {
    /// Catalog file path
    path: PathBuf,
    /// File opened for appending
    file: File,
    /// Length of the file up to the last complete frame
    len: u64,
    /// LSN the next record will get
    next_lsn: u64,
    /// When to fsync
    sync_strategy: CatalogSyncStrategy,
    /// Records written since the last fsync
    uncommitted: usize,
    /// Set when a torn frame could not be cut off
    poisoned: bool,
}

impl CatalogWriter {
    /// Open or create a catalog file for appending
    ///
    /// `next_lsn` comes from recovery: last recovered LSN + 1, or 1 for an
    /// empty catalog.
    pub fn open(path: &Path, sync_strategy: CatalogSyncStrategy, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            next_lsn: next_lsn.max(1),
            sync_strategy,
            uncommitted: 0,
            poisoned: false,
        })
    }

    /// Append a record; returns it with its assigned LSN
    pub fn append(&mut self, meta: ObjectMeta, location: ObjectLocation) -> Result<CatalogRecord> {
        if self.poisoned {
            return Err(ZixError::CatalogCorruption(format!(
                "{} has a torn tail that could not be removed",
                self.path.display()
            )));
        }

        let record = CatalogRecord::new(self.next_lsn, meta, location);
        let frame = record.serialize()?;

        if let Err(e) = self.write_frame(&frame) {
            self.rollback();
            return Err(e);
        }

        self.len += frame.len() as u64;
        self.next_lsn += 1;
        Ok(record)
    }

    /// Write one frame and apply the sync strategy
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        // One write per frame so a crash leaves at most one torn tail
        self.file.write_all(frame)?;

        match self.sync_strategy {
            CatalogSyncStrategy::EveryWrite => self.sync_file()?,
            CatalogSyncStrategy::EveryNEntries { count } => {
                if self.uncommitted + 1 >= count {
                    self.sync_file()?;
                } else {
                    self.uncommitted += 1;
                }
            }
        }
        Ok(())
    }

    /// Cut the file back to the end of the last complete frame
    fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.len) {
            warn!(
                path = %self.path.display(),
                len = self.len,
                error = %e,
                "failed to truncate catalog after write error"
            );
            self.poisoned = true;
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.sync_file()
    }

    fn sync_file(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// LSN the next appended record will get
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Records appended since the last sync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// True once a failed append could not be cut off
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Catalog file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
