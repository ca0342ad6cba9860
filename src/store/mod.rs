//! The storage capability: a key-addressed blob store with no native
//! directory concept.
//!
//! Everything durable lives behind [`BlobStore`]. The portal service only
//! ever sees full object keys, byte payloads, and [`ObjectRecord`] metadata;
//! hierarchy is a naming convention layered on top by the caller.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod azure;
pub mod fs;
pub mod memory;

/// Metadata for one stored object, as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// Full object key. `/` is a hierarchy delimiter by convention only.
    pub key: String,

    /// Payload length in bytes.
    pub size_bytes: i64,

    /// Content type (MIME type), if the backend recorded one.
    pub content_type: Option<String>,

    /// Timestamp when the object was last written.
    pub last_modified: DateTime<Utc>,

    /// Free-form string metadata. Insertion order is irrelevant.
    pub metadata: HashMap<String, String>,
}

/// Channel end a caller hands in to observe upload progress percentages.
pub type ProgressSender = mpsc::UnboundedSender<u8>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("container `{0}` not found")]
    ContainerNotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error("storage backend rejected the request: {0}")]
    Backend(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Xml(#[from] quick_xml::de::DeError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty and oversized keys, keys that begin with `/`, and keys that
/// contain `..`, control bytes, or backslashes. Keys may contain `/` freely;
/// the store itself is flat.
pub fn ensure_key_safe(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StoreError::InvalidKey);
    }
    if key.starts_with('/') || key.contains("..") {
        return Err(StoreError::InvalidKey);
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StoreError::InvalidKey);
    }
    Ok(())
}

/// The capability interface every storage backend implements.
///
/// All operations are asynchronous; none of them retries. Listing must fully
/// drain the backend's own continuation/paging mechanism before returning.
/// `put` has last-writer-wins overwrite semantics.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Create the target container if it does not exist yet.
    async fn ensure_container(&self) -> StoreResult<()>;

    /// Check that the backend is reachable and the container exists.
    async fn container_exists(&self) -> StoreResult<bool>;

    /// Enumerate every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectRecord>>;

    /// Write an object, overwriting any previous object at `key`.
    ///
    /// When `progress` is supplied the backend reports transfer percentages
    /// through it as bytes move; see [`ProgressReporter`] for the contract.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
        metadata: HashMap<String, String>,
        progress: Option<ProgressSender>,
    ) -> StoreResult<ObjectRecord>;

    /// Fetch an object's metadata and full payload.
    async fn get(&self, key: &str) -> StoreResult<(ObjectRecord, Bytes)>;

    /// Delete the object at `key`.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Emits upload percentages that are monotone non-decreasing within [0, 100].
///
/// Completion of the surrounding operation is signalled by the operation's
/// future resolving, not by a final 100 event; receivers must not wait for
/// one. A dropped or full receiver is ignored so progress can never fail an
/// upload.
pub struct ProgressReporter {
    tx: Option<ProgressSender>,
    total: u64,
    sent: u64,
    last: Option<u8>,
}

impl ProgressReporter {
    pub fn new(tx: Option<ProgressSender>, total_bytes: u64) -> Self {
        Self {
            tx,
            total: total_bytes,
            sent: 0,
            last: None,
        }
    }

    /// Record `bytes` more bytes as transferred and emit the new percentage
    /// if it advanced.
    pub fn advance(&mut self, bytes: u64) {
        self.sent = self.sent.saturating_add(bytes).min(self.total);
        let pct = if self.total == 0 {
            100
        } else {
            ((self.sent * 100) / self.total) as u8
        };
        if self.last.is_some_and(|last| pct <= last) {
            return;
        }
        self.last = Some(pct);
        if let Some(tx) = &self.tx {
            let _ = tx.send(pct);
        }
    }
}

/// Chunk size used by backends that emit progress while copying an
/// in-memory payload.
pub(crate) const PROGRESS_CHUNK: usize = 64 * 1024;
