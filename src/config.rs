//! Configuration for Zixstore
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, ZixError};
use crate::object::ContentDigest;

/// Maximum lot size before rotation.
///
/// Measured as `512 * 1024 * 1000` (a decimal-MB approximation). Existing zones
/// depend on this exact threshold, so do not "fix" it to 512 MiB.
pub const ZIX_SIZE_MAX: u64 = 512 * 1024 * 1000;

/// Main configuration for a Zixstore engine
#[derive(Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Zone Configuration
    // -------------------------------------------------------------------------
    /// Directory holding every lot of this storage.
    /// Internal structure:
    ///   {zone_dir}/
    ///     ├── {storage_name}.zl.1     (lot 1)
    ///     ├── {storage_name}.zl.N     (lot N, the active one)
    ///     └── {storage_name}.zi       (object catalog)
    pub zone_dir: PathBuf,

    /// Logical storage name, used as the lot and catalog file prefix
    pub storage_name: String,

    /// Create the zone directory when it does not exist
    pub create_zone: bool,

    // -------------------------------------------------------------------------
    // Lot Configuration
    // -------------------------------------------------------------------------
    /// Size (in bytes) at which the active lot is sealed and a new one started
    pub lot_size_max: u64,

    // -------------------------------------------------------------------------
    // Catalog Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the catalog
    pub catalog_sync_strategy: CatalogSyncStrategy,

    /// Digest computed over each object while it is uploaded
    pub digest: Option<Arc<dyn ContentDigest>>,
}

/// Catalog sync strategy
#[derive(Debug, Clone, Copy)]
pub enum CatalogSyncStrategy {
    /// fsync after every record (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced records
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zone_dir: PathBuf::from("./zix_zone"),
            storage_name: "zix".to_string(),
            create_zone: false,
            lot_size_max: ZIX_SIZE_MAX,
            catalog_sync_strategy: CatalogSyncStrategy::EveryWrite,
            digest: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("zone_dir", &self.zone_dir)
            .field("storage_name", &self.storage_name)
            .field("create_zone", &self.create_zone)
            .field("lot_size_max", &self.lot_size_max)
            .field("catalog_sync_strategy", &self.catalog_sync_strategy)
            .field("digest", &self.digest.as_ref().map(|d| d.algorithm()))
            .finish()
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values the engine cannot work with
    ///
    /// Lot file names must split into exactly three dot-delimited parts,
    /// so the storage name may not contain a dot.
    pub fn validate(&self) -> Result<()> {
        if self.storage_name.is_empty() {
            return Err(ZixError::Config("storage name is empty".to_string()));
        }
        if self.storage_name.contains('.') {
            return Err(ZixError::Config(format!(
                "storage name '{}' must not contain '.'",
                self.storage_name
            )));
        }
        if self.storage_name.contains(['/', '\\']) {
            return Err(ZixError::Config(format!(
                "storage name '{}' must not contain a path separator",
                self.storage_name
            )));
        }
        if self.lot_size_max == 0 {
            return Err(ZixError::Config("lot_size_max must be non-zero".to_string()));
        }
        if let CatalogSyncStrategy::EveryNEntries { count: 0 } = self.catalog_sync_strategy {
            return Err(ZixError::Config(
                "catalog sync count must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the zone directory
    pub fn zone_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.zone_dir = path.into();
        self
    }

    /// Set the logical storage name
    pub fn storage_name(mut self, name: impl Into<String>) -> Self {
        self.config.storage_name = name.into();
        self
    }

    /// Create the zone directory on open if it is missing
    pub fn create_zone(mut self, create: bool) -> Self {
        self.config.create_zone = create;
        self
    }

    /// Set the lot rotation threshold (in bytes)
    pub fn lot_size_max(mut self, size: u64) -> Self {
        self.config.lot_size_max = size;
        self
    }

    /// Set the catalog sync strategy
    pub fn catalog_sync_strategy(mut self, strategy: CatalogSyncStrategy) -> Self {
        self.config.catalog_sync_strategy = strategy;
        self
    }

    /// Compute this digest over every uploaded object
    pub fn digest(mut self, digest: Arc<dyn ContentDigest>) -> Self {
        self.config.digest = Some(digest);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
