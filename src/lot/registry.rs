//! Lot Registry
//!
//! In-memory ordered list of the lots in a zone.
//!
//! ## Responsibilities
//! - Discover existing lot files on startup
//! - Keep lots ordered by sequence (oldest → newest)
//! - Enforce dense, strictly increasing sequences on append

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Result, ZixError};

use super::{parse_lot_sequence, Lot};

/// Ordered collection of the lots in one zone
#[derive(Debug, Clone, Default)]
pub struct LotRegistry {
    /// Lots ordered by sequence, oldest first
    lots: Vec<Lot>,
}

impl LotRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the zone directory and build the registry
    ///
    /// On startup:
    /// 1. Visit every regular file in the zone
    /// 2. Keep files named `<name>.zl.<sequence>`
    /// 3. Skip (and log) lot-looking files with a bad sequence
    /// 4. Sort by sequence
    pub fn discover(zone_dir: &Path) -> Result<Self> {
        let mut lots = Vec::new();

        for entry in fs::read_dir(zone_dir)? {
            let entry = entry?;
            let file_path = entry.path();

            if !file_path.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            match parse_lot_sequence(&file_name) {
                Ok(Some(sequence)) => {
                    let size_bytes = entry.metadata()?.len();
                    lots.push(Lot {
                        file_name,
                        file_path,
                        size_bytes,
                        sequence,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(zone = %zone_dir.display(), error = %e, "skipping lot file");
                }
            }
        }

        lots.sort_by_key(|lot| lot.sequence);

        if let Some(dup) = lots.windows(2).find(|w| w[0].sequence == w[1].sequence) {
            return Err(ZixError::Registry(format!(
                "Lots {} and {} share sequence {}",
                dup[0].file_name, dup[1].file_name, dup[0].sequence
            )));
        }
        for (expected, lot) in (1u64..).zip(lots.iter()) {
            if lot.sequence != expected {
                warn!(
                    zone = %zone_dir.display(),
                    expected,
                    found = lot.sequence,
                    "gap in lot sequence"
                );
                break;
            }
        }

        debug!(zone = %zone_dir.display(), lots = lots.len(), "discovered lots");

        Ok(Self { lots })
    }

    /// All lots, ordered by sequence
    pub fn list(&self) -> &[Lot] {
        &self.lots
    }

    /// Add a newly created lot; its sequence must follow the last one
    pub fn append(&mut self, lot: Lot) -> Result<()> {
        let expected = self.next_sequence();
        if lot.sequence != expected {
            return Err(ZixError::Registry(format!(
                "Lot {} has sequence {}, expected {}",
                lot.file_name, lot.sequence, expected
            )));
        }
        self.lots.push(lot);
        Ok(())
    }

    /// Highest-sequence lot
    pub fn last(&self) -> Option<&Lot> {
        self.lots.last()
    }

    /// Lot with the given sequence
    pub fn get(&self, sequence: u64) -> Option<&Lot> {
        self.lots
            .binary_search_by_key(&sequence, |lot| lot.sequence)
            .ok()
            .map(|idx| &self.lots[idx])
    }

    /// Sequence the next created lot must use
    pub fn next_sequence(&self) -> u64 {
        self.lots.last().map(|lot| lot.sequence + 1).unwrap_or(1)
    }

    /// Re-measure the last lot's size on disk
    pub fn refresh_last_size(&mut self) -> Result<Option<u64>> {
        match self.lots.last_mut() {
            Some(lot) => lot.refresh_size().map(Some),
            None => Ok(None),
        }
    }

    /// Number of lots
    pub fn len(&self) -> usize {
        self.lots.len()
    }

    /// True when the zone holds no lots
    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}
