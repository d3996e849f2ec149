//! Engine Module
//!
//! The storage engine that ties lots, containers and the catalog together.
//!
//! ## Responsibilities
//! - Discover lots on startup and pick the active one
//! - Rotate to a new lot once the active one reaches `lot_size_max`
//! - Append uploads to the active lot and record them in the catalog
//! - Resolve object names to bytes (catalog first, then a scan of every lot)

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ObjectLocation, RecoveryResult, CATALOG_FILE_EXT};
use crate::config::Config;
use crate::container::{CompressionMode, Container, ContainerEntry, LOT_COMMENT};
use crate::error::{Result, ZixError};
use crate::lot::{Lot, LotRegistry};
use crate::object::{now_millis, DigestReader, ObjectId, ObjectMeta, UploadOptions};

/// The lot currently open for appends, with its writable container
struct ActiveLot {
    lot: Lot,
    container: Container,
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// Exactly one engine may own a zone at a time; nothing else may write to
/// its lot files.
///
/// - **Uploads**: Serialized by `write_lock`
///   - Only ONE upload at a time
///   - Must acquire: write_lock → active (write) → registry (write)
///
/// - **Downloads**: No write_lock needed
///   - Every download opens its own read-only container handle
///   - Reads of the active lot hold `active` for reading, so they never
///     observe a half-written directory. They wait for an in-flight upload,
///     which holds `active` for writing until its append, catalog record
///     and rotation are done
///   - Reads of sealed lots release `active` before opening the lot
///   - `registry` is never held while taking `active`
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Every lot in the zone, ordered by sequence
    registry: RwLock<LotRegistry>,

    /// Active lot; `None` only while a rotation is in progress or after one failed
    active: RwLock<Option<ActiveLot>>,

    /// Object metadata and name index
    catalog: Catalog,

    /// Result of replaying the catalog at open
    recovery: RecoveryResult,

    /// Serializes uploads (append + catalog record + rotation)
    write_lock: Mutex<()>,
}

impl Engine {
    /// Open an engine over an existing zone
    ///
    /// On startup:
    /// 1. Validate config and check the zone directory
    /// 2. Discover lot files
    /// 3. Replay the catalog
    /// 4. Run the rotation policy to pick (or create) the active lot
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: The zone is provisioned externally unless asked otherwise
        config.validate()?;
        if !config.zone_dir.is_dir() {
            if config.create_zone {
                fs::create_dir_all(&config.zone_dir)?;
            } else {
                return Err(ZixError::Config(format!(
                    "zone directory {} does not exist",
                    config.zone_dir.display()
                )));
            }
        }

        // Step 2: Discover lots (sorted by sequence)
        let registry = LotRegistry::discover(&config.zone_dir).map_err(|e| match e {
            ZixError::Io(io) => ZixError::Config(format!(
                "zone directory {} is unreadable: {}",
                config.zone_dir.display(),
                io
            )),
            other => other,
        })?;

        // Step 3: Replay the catalog
        let catalog_path = Self::catalog_path_for(&config);
        let (catalog, recovery) = Catalog::open(&catalog_path, config.catalog_sync_strategy)?;

        info!(
            zone = %config.zone_dir.display(),
            storage = %config.storage_name,
            lots = registry.len(),
            objects = catalog.len(),
            "opening zone"
        );

        let engine = Self {
            config,
            registry: RwLock::new(registry),
            active: RwLock::new(None),
            catalog,
            recovery,
            write_lock: Mutex::new(()),
        };

        // Step 4: Select the active lot
        {
            let mut active = engine.active.write();
            engine.sync_active(&mut active)?;
        }

        Ok(engine)
    }

    /// Open with a zone path and storage name (convenience method)
    ///
    /// Uses default config otherwise
    pub fn open_path(zone_dir: &Path, storage_name: &str) -> Result<Self> {
        let config = Config::builder()
            .zone_dir(zone_dir)
            .storage_name(storage_name)
            .build();
        Self::open(config)
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Upload the file at `source_path` under `object_name`
    pub fn upload(&self, source_path: &Path, object_name: &str) -> Result<ObjectId> {
        self.upload_with(source_path, object_name, UploadOptions::default())
    }

    /// Upload with caller-supplied attributes
    ///
    /// Steps:
    /// 1. Validate the name and reject duplicates
    /// 2. Append the bytes to the active lot (store mode) and sync it
    /// 3. Record metadata + location in the catalog
    /// 4. Close the handle and re-run rotation
    ///
    /// Failures in steps 2 and 3 come back as `UploadFailed` and leave the
    /// lot without the entry. A failed rotation in step 4 is logged and the
    /// upload still succeeds.
    pub fn upload_with(
        &self,
        source_path: &Path,
        object_name: &str,
        options: UploadOptions,
    ) -> Result<ObjectId> {
        validate_object_name(object_name)?;

        // Acquire write lock to serialize uploads
        let _write_guard = self.write_lock.lock();

        if self.catalog.contains(object_name) {
            return Err(ZixError::ObjectExists(object_name.to_string()));
        }

        self.upload_locked(source_path, object_name, options)
            .map_err(|e| ZixError::upload_failed(object_name, e))
    }

    /// Upload body (called with write lock held)
    fn upload_locked(
        &self,
        source_path: &Path,
        object_name: &str,
        options: UploadOptions,
    ) -> Result<ObjectId> {
        let source = File::open(source_path)?;
        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut reader = DigestReader::new(BufReader::new(source), self.config.digest.as_deref());

        let mut active = self.active.write();

        // A previous rotation may have failed and left no active lot
        if active.is_none() {
            self.sync_active(&mut active)?;
        }
        let slot = active
            .as_mut()
            .ok_or_else(|| ZixError::Registry("no active lot after rotation".to_string()))?;

        // Step 2: Append in store mode and make the entry durable
        let entry = slot.container.append_entry(
            CompressionMode::Store,
            &mut reader,
            object_name,
            LOT_COMMENT,
        )?;
        let lot_sequence = slot.lot.sequence;
        if let Err(e) = slot.container.sync() {
            self.discard_entry(slot, &entry);
            return Err(e);
        }

        // Step 3: Persist metadata; an entry without a record is cut off again
        let meta = ObjectMeta {
            id: ObjectId::new(),
            name: object_name.to_string(),
            file_name,
            size_bytes: entry.data_len,
            uploaded_at: now_millis(),
            checksum: reader.finish(),
            content_type: options.content_type,
        };
        let id = meta.id;
        let location = ObjectLocation {
            lot_sequence,
            entry_name: entry.name.clone(),
        };
        if let Err(e) = self.catalog.insert(meta, location) {
            self.discard_entry(slot, &entry);
            return Err(e);
        }

        // Step 4: Let rotation seal an overflowing lot right away. The object
        // is already stored, so a failure here only leaves no active lot and
        // the next upload retries the rotation.
        if let Err(e) = self.sync_active(&mut active) {
            warn!(object = %object_name, error = %e, "rotation after upload failed");
        }
        drop(active);

        debug!(object = %object_name, %id, lot = lot_sequence, bytes = entry.data_len, "uploaded");

        Ok(id)
    }

    /// Roll the active container back after a failed upload
    fn discard_entry(&self, slot: &mut ActiveLot, entry: &ContainerEntry) {
        if let Err(e) = slot.container.discard_last_entry(entry) {
            warn!(
                lot = %slot.lot.file_name,
                entry = %entry.name,
                error = %e,
                "failed to discard entry after upload error"
            );
        }
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// Rotation policy: release the current handle, then pick the active lot
    ///
    /// - No lots → create lot 1
    /// - Last lot below `lot_size_max` → reopen it
    /// - Otherwise → create lot `last + 1`
    fn sync_active(&self, active: &mut Option<ActiveLot>) -> Result<()> {
        // Release (flush + close) before deciding
        if let Some(current) = active.take() {
            current.container.close()?;
        }

        let mut registry = self.registry.write();

        let next = match registry.refresh_last_size()? {
            Some(size) if size < self.config.lot_size_max => {
                let lot = registry
                    .last()
                    .cloned()
                    .ok_or_else(|| ZixError::Registry("registry emptied during rotation".to_string()))?;
                let container = match Container::open(&lot.file_path) {
                    Ok(container) => container,
                    // A crash mid-append leaves no valid footer
                    Err(ZixError::Container(reason)) => {
                        warn!(lot = %lot.file_name, %reason, "active lot is damaged, repairing");
                        let container = Container::repair(&lot.file_path)?;
                        registry.refresh_last_size()?;
                        container
                    }
                    Err(e) => return Err(e),
                };
                debug!(lot = %lot.file_name, size, "reusing active lot");
                let lot = registry.last().cloned().unwrap_or(lot);
                ActiveLot { lot, container }
            }
            Some(size) => {
                info!(size, max = self.config.lot_size_max, "lot full, rotating");
                self.create_lot(&mut registry)?
            }
            None => self.create_lot(&mut registry)?,
        };

        *active = Some(next);
        Ok(())
    }

    /// Create the next lot on disk and register it
    fn create_lot(&self, registry: &mut LotRegistry) -> Result<ActiveLot> {
        let mut lot = Lot::new(
            &self.config.zone_dir,
            &self.config.storage_name,
            registry.next_sequence(),
        );

        if lot.file_path.exists() {
            return Err(ZixError::Registry(format!(
                "{} already exists but is not registered",
                lot.file_path.display()
            )));
        }

        let container = Container::create(&lot.file_path, LOT_COMMENT)?;
        lot.size_bytes = container.size()?;
        registry.append(lot.clone())?;

        info!(lot = %lot.file_name, sequence = lot.sequence, "created lot");

        Ok(ActiveLot { lot, container })
    }

    // =========================================================================
    // Download
    // =========================================================================

    /// Download an object by name
    ///
    /// Returns:
    /// - `Ok(Some(bytes))`: object found
    /// - `Ok(None)`: no lot holds the name
    pub fn download(&self, name: &str) -> Result<Option<Bytes>> {
        let mut buf = Vec::new();
        match self.download_to(name, &mut buf)? {
            Some(_) => Ok(Some(Bytes::from(buf))),
            None => Ok(None),
        }
    }

    /// Like `download`, but a missing object is an `ObjectNotFound` error
    pub fn fetch(&self, name: &str) -> Result<Bytes> {
        self.download(name)?
            .ok_or_else(|| ZixError::ObjectNotFound(name.to_string()))
    }

    /// Stream an object into `sink`, returning the byte count
    ///
    /// Search order:
    /// 1. Catalog location (one lot)
    /// 2. Every lot, oldest → newest; first match wins
    pub fn download_to<W: Write>(&self, name: &str, sink: &mut W) -> Result<Option<u64>> {
        // Step 1: Catalog lookup
        if let Some(entry) = self.catalog.get(name) {
            let lot = self.registry.read().get(entry.location.lot_sequence).cloned();
            match lot {
                Some(lot) => {
                    if let Some(n) = self.read_from_lot(&lot, &entry.location.entry_name, sink)? {
                        debug!(object = %name, lot = lot.sequence, bytes = n, "downloaded via catalog");
                        return Ok(Some(n));
                    }
                    warn!(object = %name, lot = lot.sequence, "catalog points at a lot without the entry");
                }
                None => {
                    warn!(
                        object = %name,
                        lot = entry.location.lot_sequence,
                        "catalog points at an unknown lot"
                    );
                }
            }
        }

        // Step 2: Linear scan
        let lots = self.registry.read().list().to_vec();
        for lot in &lots {
            if let Some(n) = self.read_from_lot(lot, name, sink)? {
                debug!(object = %name, lot = lot.sequence, bytes = n, "downloaded via scan");
                return Ok(Some(n));
            }
        }

        Ok(None)
    }

    /// Extract `entry_name` from one lot through a fresh read-only handle
    fn read_from_lot<W: Write>(&self, lot: &Lot, entry_name: &str, sink: &mut W) -> Result<Option<u64>> {
        // Hold the shared lock only for the active lot, so no append is in flight
        let active = self.active.read();
        let is_active = active
            .as_ref()
            .map(|a| a.lot.sequence == lot.sequence)
            .unwrap_or(false);
        let _active_guard = if is_active {
            Some(active)
        } else {
            drop(active);
            None
        };

        let mut container = Container::open_read(&lot.file_path)?;
        let entry = match container.find(entry_name).cloned() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        container.extract(&entry, sink).map(Some)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Flushes and closes the active lot and syncs the catalog
    pub fn close(self) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        if let Some(current) = self.active.write().take() {
            current.container.close()?;
        }
        self.catalog.sync()?;

        info!(zone = %self.config.zone_dir.display(), "zone closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for diagnostics and testing)
    // =========================================================================

    /// The lot currently open for appends
    pub fn current_lot(&self) -> Option<Lot> {
        self.active.read().as_ref().map(|a| a.lot.clone())
    }

    /// All lots, ordered by sequence
    pub fn lots(&self) -> Vec<Lot> {
        self.registry.read().list().to_vec()
    }

    /// Number of lots in the zone
    pub fn lot_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Metadata of a catalogued object
    pub fn object_meta(&self, name: &str) -> Option<ObjectMeta> {
        self.catalog.get(name).map(|e| e.meta)
    }

    /// Lot and entry a catalogued object was written to
    pub fn location(&self, name: &str) -> Option<ObjectLocation> {
        self.catalog.get(name).map(|e| e.location)
    }

    /// Metadata of every catalogued object, in upload order
    pub fn objects(&self) -> Vec<ObjectMeta> {
        self.catalog.entries().into_iter().map(|e| e.meta).collect()
    }

    /// Number of catalogued objects
    pub fn object_count(&self) -> usize {
        self.catalog.len()
    }

    /// Check whether an object name is catalogued
    pub fn contains(&self, name: &str) -> bool {
        self.catalog.contains(name)
    }

    /// Catalog replay statistics from open
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Get the zone directory path
    pub fn zone_dir(&self) -> &Path {
        &self.config.zone_dir
    }

    /// Get the catalog file path
    pub fn catalog_path(&self) -> &Path {
        self.catalog.path()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn catalog_path_for(config: &Config) -> PathBuf {
        config
            .zone_dir
            .join(format!("{}.{}", config.storage_name, CATALOG_FILE_EXT))
    }
}

/// Object names become container entry names
fn validate_object_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ZixError::InvalidObjectName("name is empty".to_string()));
    }
    if name.len() > u16::MAX as usize {
        return Err(ZixError::InvalidObjectName(format!(
            "name is {} bytes, max is {}",
            name.len(),
            u16::MAX
        )));
    }
    Ok(())
}
