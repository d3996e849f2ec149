//! Error types for Zixstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ZixError
pub type Result<T> = std::result::Result<T, ZixError>;

/// Unified error type for Zixstore operations
#[derive(Debug, Error)]
pub enum ZixError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lot Errors
    // -------------------------------------------------------------------------
    #[error("Malformed lot filename: {file_name}")]
    MalformedLotFilename { file_name: String },

    #[error("Lot registry error: {0}")]
    Registry(String),

    // -------------------------------------------------------------------------
    // Container Errors
    // -------------------------------------------------------------------------
    #[error("Container error: {0}")]
    Container(String),

    // -------------------------------------------------------------------------
    // Object Errors
    // -------------------------------------------------------------------------
    #[error("Upload of '{name}' failed: {source}")]
    UploadFailed {
        name: String,
        #[source]
        source: Box<ZixError>,
    },

    #[error("Object already exists: {0}")]
    ObjectExists(String),

    #[error("Invalid object name: {0}")]
    InvalidObjectName(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    // -------------------------------------------------------------------------
    // Catalog Errors
    // -------------------------------------------------------------------------
    #[error("Catalog corruption detected: {0}")]
    CatalogCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ZixError {
    /// Wrap an error raised inside the upload critical section.
    pub(crate) fn upload_failed(name: &str, source: ZixError) -> Self {
        ZixError::UploadFailed {
            name: name.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<bincode::Error> for ZixError {
    fn from(e: bincode::Error) -> Self {
        ZixError::Serialization(e.to_string())
    }
}
