//! # Zixstore
//!
//! A segmented object store that keeps named blobs ("zix") in a bounded set
//! of container files ("lots") inside one directory (the "zone"):
//! - Lot discovery at startup
//! - Size-bounded lot rotation
//! - Name lookup through a durable catalog, with a scan of every lot as fallback
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                               │
//! │       upload (serialized)  ·  download (concurrent)          │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │                      │                       │
//!        ▼                      ▼                       ▼
//!  ┌─────────────┐      ┌──────────────┐        ┌─────────────┐
//!  │ LotRegistry │      │  Active Lot  │        │   Catalog   │
//!  │  (RwLock)   │      │  (rotation)  │        │ (name index)│
//!  └──────┬──────┘      └──────┬───────┘        └─────────────┘
//!         │                    │
//!         ▼                    ▼
//!  ┌─────────────────────────────────────┐
//!  │   Containers: store.zl.1 … zl.N     │
//!  └─────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod object;
pub mod container;
pub mod lot;
pub mod catalog;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ZixError, Result};
pub use config::{Config, ZIX_SIZE_MAX};
pub use engine::Engine;
pub use lot::Lot;
pub use object::{ObjectId, ObjectMeta, UploadOptions};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Zixstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
