//! Object Model
//!
//! Identifiers and metadata for objects stored in lots.
//!
//! ## Responsibilities
//! - Generate object identifiers
//! - Describe an uploaded object (`ObjectMeta`)
//! - Pluggable content digests, computed while the object streams into a lot

use std::fmt;
use std::io::{self, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of an uploaded object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Creates a new random object ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Converts to a UUID.
    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A digest value tagged with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: String,
    pub value: Vec<u8>,
}

impl Checksum {
    /// Lowercase hex rendering of the digest bytes
    pub fn to_hex(&self) -> String {
        self.value.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Metadata recorded for every uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Identifier returned by upload
    pub id: ObjectId,

    /// Name the object is stored and looked up under
    pub name: String,

    /// File name of the uploaded source
    pub file_name: String,

    /// Object size in bytes
    pub size_bytes: u64,

    /// Upload time (unix millis)
    pub uploaded_at: u64,

    /// Content digest, when one is configured
    pub checksum: Option<Checksum>,

    /// Content type declared by the uploader
    pub content_type: Option<String>,
}

/// Caller-supplied attributes for an upload
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
}

impl UploadOptions {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

// =============================================================================
// Content Digests
// =============================================================================

/// A digest algorithm that can be computed over an object's bytes
pub trait ContentDigest: Send + Sync {
    /// Algorithm tag stored next to the digest value
    fn algorithm(&self) -> &str;

    /// Start a new incremental computation
    fn hasher(&self) -> Box<dyn DigestHasher>;
}

/// Incremental state of one digest computation
pub trait DigestHasher: Send {
    fn update(&mut self, bytes: &[u8]);

    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// CRC32 (IEEE) digest, big-endian encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Digest;

impl ContentDigest for Crc32Digest {
    fn algorithm(&self) -> &str {
        "crc32"
    }

    fn hasher(&self) -> Box<dyn DigestHasher> {
        Box::new(Crc32Hasher(crc32fast::Hasher::new()))
    }
}

struct Crc32Hasher(crc32fast::Hasher);

impl DigestHasher for Crc32Hasher {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_be_bytes().to_vec()
    }
}

/// Reader adapter that feeds every byte it yields into a digest
pub(crate) struct DigestReader<'a, R> {
    inner: R,
    hasher: Option<Box<dyn DigestHasher>>,
    algorithm: Option<&'a str>,
}

impl<'a, R: Read> DigestReader<'a, R> {
    pub(crate) fn new(inner: R, digest: Option<&'a dyn ContentDigest>) -> Self {
        Self {
            inner,
            hasher: digest.map(|d| d.hasher()),
            algorithm: digest.map(|d| d.algorithm()),
        }
    }

    pub(crate) fn finish(self) -> Option<Checksum> {
        match (self.algorithm, self.hasher) {
            (Some(algorithm), Some(hasher)) => Some(Checksum {
                algorithm: algorithm.to_string(),
                value: hasher.finalize(),
            }),
            _ => None,
        }
    }
}

impl<R: Read> Read for DigestReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Current time as unix milliseconds
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
